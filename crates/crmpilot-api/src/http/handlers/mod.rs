//! Request handlers for REST and WebSocket endpoints.

pub mod history;
pub mod session;
pub mod status;
pub mod ws;

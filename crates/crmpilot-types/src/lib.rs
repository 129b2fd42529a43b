//! Shared domain types for CRM Pilot.
//!
//! This crate holds the data model exchanged between the orchestration core,
//! the infrastructure implementations, and the API layer: sessions, turns,
//! intents, CRM payloads, wire protocol envelopes, configuration, and the
//! error taxonomy. It performs no I/O.

pub mod config;
pub mod crm;
pub mod error;
pub mod intent;
pub mod protocol;
pub mod session;
pub mod turn;

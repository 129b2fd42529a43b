//! Session-scoped real-time orchestration core.
//!
//! This crate turns parsed user utterances into exactly one CRM operation
//! each, with per-session FIFO ordering, idempotent history recording, and
//! reconnect-safe delivery. Collaborator traits ([`adapter::CrmAdapter`],
//! [`inference::IntentProvider`], [`history::HistoryRepository`]) are defined
//! here; concrete implementations live in `crmpilot-infra`.
//!
//! Request cycle for one utterance:
//!
//! ```text
//! Received -> Parsing -> (Unknown -> Clarifying -> Done)
//!                      | (Recognized -> Dispatching -> Succeeded|Failed -> Done)
//! ```
//!
//! Terminal states always append exactly one assistant turn, whether or not
//! a live channel exists to push it to.

pub mod adapter;
pub mod channel;
pub mod dispatch;
pub mod emitter;
pub mod history;
pub mod inference;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;

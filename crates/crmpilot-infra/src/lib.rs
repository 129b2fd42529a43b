//! Infrastructure implementations for CRM Pilot.
//!
//! Concrete collaborators behind the core's traits: the SQLite-backed
//! conversation store, CRM adapters (in-memory mock and Odoo JSON-RPC),
//! intent providers (offline keyword heuristics and an OpenAI-compatible
//! HTTP client), and the TOML configuration loader.

pub mod config;
pub mod crm;
pub mod inference;
pub mod sqlite;

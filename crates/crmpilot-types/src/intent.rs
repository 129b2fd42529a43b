//! Structured intents parsed from natural language.
//!
//! The intent pipeline turns one user utterance into an [`Intent`] whose kind
//! is drawn from a closed enumeration. Anything the inference collaborator
//! produces that does not map into that enumeration is downgraded to
//! [`IntentKind::Unknown`] with a detail label, never propagated as a raw
//! parsing error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use std::collections::BTreeMap;
use std::fmt;

/// Closed set of operations the orchestrator knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentKind {
    CreateCustomer,
    SearchCustomer,
    UpdateCustomer,
    CreateOrder,
    SearchProduct,
    Unknown,
}

impl IntentKind {
    /// Map the inference collaborator's `(action, entity_type)` pair into
    /// the closed enumeration. Unrecognized pairs yield `None`.
    pub fn from_action(action: &str, entity_type: &str) -> Option<Self> {
        match (action, entity_type) {
            ("create", "customer") => Some(IntentKind::CreateCustomer),
            ("search", "customer") => Some(IntentKind::SearchCustomer),
            ("update", "customer") => Some(IntentKind::UpdateCustomer),
            ("create", "order") => Some(IntentKind::CreateOrder),
            ("search", "product") => Some(IntentKind::SearchProduct),
            _ => None,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentKind::CreateCustomer => write!(f, "create-customer"),
            IntentKind::SearchCustomer => write!(f, "search-customer"),
            IntentKind::UpdateCustomer => write!(f, "update-customer"),
            IntentKind::CreateOrder => write!(f, "create-order"),
            IntentKind::SearchProduct => write!(f, "search-product"),
            IntentKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Raw structured payload returned by the inference collaborator.
///
/// This mirrors the provider contract `{action, entity_type, entities,
/// confidence}`; validation into an [`Intent`] happens in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIntent {
    pub action: String,
    pub entity_type: String,
    #[serde(default)]
    pub entities: BTreeMap<String, Value>,
    #[serde(default)]
    pub confidence: f32,
}

/// Validated interpretation of one user utterance.
///
/// Transient: produced and consumed within a single request cycle, recorded
/// only through the turn that answers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    #[serde(default)]
    pub entities: BTreeMap<String, Value>,
    pub confidence: f32,
    /// Why an utterance ended up `Unknown` (e.g. "inference-unavailable",
    /// "malformed-response", "low-confidence").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Intent {
    /// An `Unknown` intent carrying the reason it could not be recognized.
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Unknown,
            entities: BTreeMap::new(),
            confidence: 0.0,
            detail: Some(detail.into()),
        }
    }

    /// Fetch a string-valued entity by name.
    pub fn entity_str(&self, name: &str) -> Option<&str> {
        self.entities.get(name).and_then(Value::as_str)
    }
}

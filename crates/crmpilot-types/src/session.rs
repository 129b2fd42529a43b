//! Session identity and metadata.
//!
//! A session is a logical, resumable conversation identified by an opaque
//! token. It outlives any single WebSocket connection: clients reconnect
//! with the same id and pull history to reconcile missed turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;

/// Opaque session identifier.
///
/// Newly created sessions use a UUIDv7 string, but the registry treats the
/// token as opaque: clients may present any id and `join_session` will
/// create the session on first contact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh time-sortable session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Metadata the registry tracks per session.
///
/// Lifecycle: created on first contact, refreshed by `touch`, removed by the
/// periodic inactivity sweep. The live channel binding is held separately by
/// the registry entry, not serialized here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u64,
}

impl SessionMeta {
    /// Fresh metadata for a session created now.
    pub fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            created_at: now,
            last_activity: now,
            message_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_serializes_transparently() {
        let id = SessionId::from("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
    }

    #[test]
    fn new_meta_starts_with_zero_messages() {
        let meta = SessionMeta::new(SessionId::generate());
        assert_eq!(meta.message_count, 0);
        assert_eq!(meta.created_at, meta.last_activity);
    }
}

//! Conversation turns.
//!
//! A turn is one immutable, sequence-numbered unit of conversation history.
//! Sequence numbers are assigned by the history store at append time and are
//! strictly increasing and gapless within a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::session::SessionId;

/// Who produced a turn.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('user', 'assistant', 'system-error'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnRole {
    User,
    Assistant,
    SystemError,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
            TurnRole::SystemError => write!(f, "system-error"),
        }
    }
}

impl FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            "system-error" => Ok(TurnRole::SystemError),
            other => Err(format!("invalid turn role: '{other}'")),
        }
    }
}

/// A stored conversation turn.
///
/// `seq` is unique within the session and assigned by the store; `error_code`
/// carries the machine-readable failure label for observability and is never
/// required to render `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub session_id: SessionId,
    pub seq: u64,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Machine-readable error label (failure turns only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Structured operation payload (assistant turns only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// A turn awaiting its sequence number.
///
/// The history store turns this into a [`Turn`] by assigning `seq` at
/// append time, keeping sequence allocation in one place.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub role: TurnRole,
    pub content: String,
    pub error_code: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl NewTurn {
    /// A plain user utterance.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            error_code: None,
            payload: None,
        }
    }

    /// An assistant reply, optionally carrying a structured payload.
    pub fn assistant(content: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            error_code: None,
            payload,
        }
    }

    /// A failure turn with its machine-readable label attached.
    pub fn system_error(content: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            role: TurnRole::SystemError,
            content: content.into(),
            error_code: Some(error_code.into()),
            payload: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [TurnRole::User, TurnRole::Assistant, TurnRole::SystemError] {
            let parsed: TurnRole = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn invalid_role_is_rejected() {
        assert!("moderator".parse::<TurnRole>().is_err());
    }

    #[test]
    fn builders_set_role_and_code() {
        let user = NewTurn::user("hi");
        assert_eq!(user.role, TurnRole::User);
        assert!(user.error_code.is_none());

        let err = NewTurn::system_error("sorry", "inference-unavailable");
        assert_eq!(err.role, TurnRole::SystemError);
        assert_eq!(err.error_code.as_deref(), Some("inference-unavailable"));
    }

    #[test]
    fn turn_serialization_skips_empty_optionals() {
        let turn = Turn {
            id: Uuid::now_v7(),
            session_id: SessionId::from("s1"),
            seq: 0,
            role: TurnRole::User,
            content: "hello".to_string(),
            created_at: Utc::now(),
            error_code: None,
            payload: None,
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert!(json.get("error_code").is_none());
        assert!(json.get("payload").is_none());
    }
}

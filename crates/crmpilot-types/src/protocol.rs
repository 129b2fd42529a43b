//! WebSocket wire protocol envelopes.
//!
//! Both directions share the outer shape `{type, timestamp, session_id,
//! data}` with a tagged `data` payload. Unknown or malformed inbound frames
//! are logged and ignored by the socket handler, never fatal to the
//! connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionId;
use crate::turn::Turn;

/// Frame received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    #[serde(flatten)]
    pub frame: InboundFrame,
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
}

/// Inbound frame payloads, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundFrame {
    /// A user utterance to process.
    Message { content: String },
    /// Client-side typing indicator. Best-effort UI plumbing.
    Typing { is_typing: bool },
    /// Bind this connection as the session's live channel.
    JoinSession,
}

/// Frame pushed to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    #[serde(flatten)]
    pub frame: OutboundFrame,
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
}

/// Outbound frame payloads, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Echo of the user's own utterance.
    UserMessage { content: String },
    /// Assistant reply text.
    AiResponse { content: String },
    /// Connection/session status notices (e.g. the join greeting).
    StatusUpdate { status: String, message: String },
    /// Server-side typing indicator around processing. Best effort.
    Typing { is_typing: bool },
    /// Request-level error with a short machine-readable label.
    Error { content: String, error: String },
}

impl OutboundEnvelope {
    /// Wrap a frame for a session, stamped now.
    pub fn now(session_id: SessionId, frame: OutboundFrame) -> Self {
        Self {
            frame,
            timestamp: Utc::now(),
            session_id,
        }
    }
}

/// One page of a session's turn history, returned by the pull endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub session_id: SessionId,
    pub turns: Vec<Turn>,
    pub total: u64,
    pub offset: u64,
}

//! Conversation history store.
//!
//! Append-only, per-session ordered turn storage. `append` is the only
//! mutation; sequence numbers are assigned here so they stay strictly
//! increasing and gapless within a session. The SQLite implementation lives
//! in `crmpilot-infra`; [`MemoryHistory`] backs unit tests and offline runs.

use chrono::Utc;
use uuid::Uuid;

use std::collections::HashMap;
use std::sync::Mutex;

use crmpilot_types::error::RepositoryError;
use crmpilot_types::session::SessionId;
use crmpilot_types::turn::{NewTurn, Turn};

/// Repository trait for turn persistence.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Appends for
/// different sessions must not interfere; within one session the caller
/// (the per-session orchestrator worker) serializes appends with dispatch.
pub trait HistoryRepository: Send + Sync {
    /// Append a turn, assigning the next per-session sequence number.
    /// Returns the stored turn.
    fn append(
        &self,
        session_id: &SessionId,
        turn: NewTurn,
    ) -> impl std::future::Future<Output = Result<Turn, RepositoryError>> + Send;

    /// The `n` most recent turns, oldest first (fewer if history is shorter).
    fn window(
        &self,
        session_id: &SessionId,
        n: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Turn>, RepositoryError>> + Send;

    /// A page of the full history, oldest first. Restartable: callers pass
    /// increasing offsets to scan everything.
    fn page(
        &self,
        session_id: &SessionId,
        offset: u64,
        limit: u64,
    ) -> impl std::future::Future<Output = Result<Vec<Turn>, RepositoryError>> + Send;

    /// Total number of turns recorded for the session.
    fn count(
        &self,
        session_id: &SessionId,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

/// In-memory history store.
///
/// Sequence assignment happens under the map lock, so the gapless invariant
/// holds under concurrent appends from different sessions.
#[derive(Default)]
pub struct MemoryHistory {
    sessions: Mutex<HashMap<SessionId, Vec<Turn>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryRepository for MemoryHistory {
    async fn append(&self, session_id: &SessionId, turn: NewTurn) -> Result<Turn, RepositoryError> {
        let mut sessions = self.sessions.lock().expect("history lock poisoned");
        let turns = sessions.entry(session_id.clone()).or_default();
        let stored = Turn {
            id: Uuid::now_v7(),
            session_id: session_id.clone(),
            seq: turns.len() as u64,
            role: turn.role,
            content: turn.content,
            created_at: Utc::now(),
            error_code: turn.error_code,
            payload: turn.payload,
        };
        turns.push(stored.clone());
        Ok(stored)
    }

    async fn window(&self, session_id: &SessionId, n: usize) -> Result<Vec<Turn>, RepositoryError> {
        let sessions = self.sessions.lock().expect("history lock poisoned");
        let turns = sessions.get(session_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = turns.len().saturating_sub(n);
        Ok(turns[start..].to_vec())
    }

    async fn page(
        &self,
        session_id: &SessionId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let sessions = self.sessions.lock().expect("history lock poisoned");
        let turns = sessions.get(session_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(turns
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, session_id: &SessionId) -> Result<u64, RepositoryError> {
        let sessions = self.sessions.lock().expect("history lock poisoned");
        Ok(sessions.get(session_id).map(Vec::len).unwrap_or(0) as u64)
    }
}

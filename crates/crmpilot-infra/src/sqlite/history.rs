//! SQLite conversation store.
//!
//! Implements `HistoryRepository` from `crmpilot-core` using sqlx with the
//! split reader/writer pool: raw queries, a private Row struct for
//! SQLite-to-domain mapping. Sequence numbers are computed inside the
//! INSERT on the single-writer connection, so they are gapless per session
//! even under concurrent appends from different sessions.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crmpilot_core::history::HistoryRepository;
use crmpilot_types::error::RepositoryError;
use crmpilot_types::session::SessionId;
use crmpilot_types::turn::{NewTurn, Turn, TurnRole};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `HistoryRepository`.
pub struct SqliteHistoryRepository {
    pool: DatabasePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain turns.
struct TurnRow {
    id: String,
    session_id: String,
    seq: i64,
    role: String,
    content: String,
    created_at: String,
    error_code: Option<String>,
    payload: Option<String>,
}

impl TurnRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            seq: row.try_get("seq")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            error_code: row.try_get("error_code")?,
            payload: row.try_get("payload")?,
        })
    }

    fn into_turn(self) -> Result<Turn, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid turn id: {e}")))?;
        let role: TurnRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;
        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid payload json: {e}")))?;

        Ok(Turn {
            id,
            session_id: SessionId::from(self.session_id),
            seq: self.seq as u64,
            role,
            content: self.content,
            created_at,
            error_code: self.error_code,
            payload,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid timestamp '{s}': {e}")))
}

fn map_sqlx(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::Io(_) => RepositoryError::Connection,
        other => RepositoryError::Query(other.to_string()),
    }
}

impl HistoryRepository for SqliteHistoryRepository {
    async fn append(&self, session_id: &SessionId, turn: NewTurn) -> Result<Turn, RepositoryError> {
        let id = Uuid::now_v7();
        let created_at = Utc::now();
        let payload = turn
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("payload not serializable: {e}")))?;

        let row = sqlx::query(
            r#"
            INSERT INTO turns (id, session_id, seq, role, content, created_at, error_code, payload)
            VALUES (
                ?1, ?2,
                (SELECT COALESCE(MAX(seq) + 1, 0) FROM turns WHERE session_id = ?2),
                ?3, ?4, ?5, ?6, ?7
            )
            RETURNING seq
            "#,
        )
        .bind(id.to_string())
        .bind(session_id.as_str())
        .bind(turn.role.to_string())
        .bind(&turn.content)
        .bind(created_at.to_rfc3339())
        .bind(&turn.error_code)
        .bind(&payload)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        let seq: i64 = row.try_get("seq").map_err(map_sqlx)?;

        Ok(Turn {
            id,
            session_id: session_id.clone(),
            seq: seq as u64,
            role: turn.role,
            content: turn.content,
            created_at,
            error_code: turn.error_code,
            payload: turn.payload,
        })
    }

    async fn window(&self, session_id: &SessionId, n: usize) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT id, session_id, seq, role, content, created_at, error_code, payload
                FROM turns WHERE session_id = ?1
                ORDER BY seq DESC LIMIT ?2
            ) ORDER BY seq ASC
            "#,
        )
        .bind(session_id.as_str())
        .bind(n as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| TurnRow::from_row(row).map_err(map_sqlx)?.into_turn())
            .collect()
    }

    async fn page(
        &self,
        session_id: &SessionId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, seq, role, content, created_at, error_code, payload
            FROM turns WHERE session_id = ?1
            ORDER BY seq ASC LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(session_id.as_str())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| TurnRow::from_row(row).map_err(map_sqlx)?.into_turn())
            .collect()
    }

    async fn count(&self, session_id: &SessionId) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM turns WHERE session_id = ?1")
            .bind(session_id.as_str())
            .fetch_one(&self.pool.reader)
            .await
            .map_err(map_sqlx)?;
        let n: i64 = row.try_get("n").map_err(map_sqlx)?;
        Ok(n as u64)
    }
}

//! Session lifecycle and message fallback endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use std::time::Instant;

use crmpilot_types::session::{SessionId, SessionMeta};
use crmpilot_types::turn::Turn;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Resume an existing session instead of minting a new id.
    pub session_id: Option<String>,
}

/// POST /api/v1/sessions - create (or resume) a session.
///
/// The body is optional; an empty POST mints a fresh session id.
pub async fn create_session(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<ApiResponse<SessionMeta>, AppError> {
    let started = Instant::now();
    let request: CreateSessionRequest = if body.is_empty() {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("invalid request body: {e}")))?
    };

    let session_id = match request.session_id {
        Some(id) if !id.trim().is_empty() => SessionId::from(id),
        Some(_) => return Err(AppError::Validation("session_id must not be blank".to_string())),
        None => SessionId::generate(),
    };

    let meta = state.orchestrator.registry().ensure(&session_id);
    tracing::debug!(session = %session_id, "session created or resumed");
    Ok(ApiResponse::success(meta, started))
}

/// GET /api/v1/sessions/{id} - session metadata.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<SessionMeta>, AppError> {
    let started = Instant::now();
    let session_id = SessionId::from(id);
    let meta = state
        .orchestrator
        .session_meta(&session_id)
        .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;
    Ok(ApiResponse::success(meta, started))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// POST /api/v1/sessions/{id}/messages - submit an utterance without a
/// WebSocket and wait for the assistant turn.
///
/// Runs through the same per-session worker queue as socket traffic, so a
/// client mixing both transports still sees strict arrival-order handling.
pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> Result<ApiResponse<Turn>, AppError> {
    let started = Instant::now();
    if body.content.trim().is_empty() {
        return Err(AppError::Validation("content must not be empty".to_string()));
    }

    let session_id = SessionId::from(id);
    let turn = state
        .orchestrator
        .submit_and_wait(&session_id, body.content)
        .await?;
    Ok(ApiResponse::success(turn, started))
}

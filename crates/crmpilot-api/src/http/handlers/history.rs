//! History pull endpoint, the reconnect-and-resume recovery path.

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use std::time::Instant;

use crmpilot_core::history::HistoryRepository;
use crmpilot_types::protocol::HistoryPage;
use crmpilot_types::session::SessionId;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 200;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// GET /api/v1/sessions/{id}/history - one page of turns, oldest first.
///
/// Served even for unknown sessions (an empty page), since a client may
/// reconnect after the registry swept its session while the turns persist.
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<ApiResponse<HistoryPage>, AppError> {
    let started = Instant::now();
    let session_id = SessionId::from(id);
    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let turns = state.history.page(&session_id, offset, limit).await?;
    let total = state.history.count(&session_id).await?;

    Ok(ApiResponse::success(
        HistoryPage {
            session_id,
            turns,
            total,
            offset,
        },
        started,
    ))
}

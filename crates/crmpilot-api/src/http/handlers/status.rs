//! Service status endpoint.

use axum::extract::State;
use serde::Serialize;

use std::time::Instant;

use crmpilot_core::adapter::CrmAdapter;
use crmpilot_core::inference::IntentProvider;
use crmpilot_core::registry::RegistryStats;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub crm_adapter: String,
    pub intent_provider: String,
    pub registry: RegistryStats,
}

/// GET /api/v1/status - registry counts and configured backends.
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<ApiResponse<StatusReport>, AppError> {
    let started = Instant::now();
    Ok(ApiResponse::success(
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            crm_adapter: state.adapter.name().to_string(),
            intent_provider: state.provider.name().to_string(),
            registry: state.orchestrator.registry().stats(),
        },
        started,
    ))
}

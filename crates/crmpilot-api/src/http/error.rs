//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crmpilot_types::error::{OrchestratorError, RepositoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// History store failure.
    Repository(RepositoryError),
    /// The request cycle could not be run.
    Orchestrator(OrchestratorError),
    /// Unknown session id.
    SessionNotFound(String),
    /// Malformed request body or parameters.
    Validation(String),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(e: OrchestratorError) -> Self {
        AppError::Orchestrator(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Repository(RepositoryError::Connection) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "HISTORY_UNAVAILABLE",
                "Conversation history store is unreachable".to_string(),
            ),
            AppError::Repository(RepositoryError::NotFound) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Record not found".to_string(),
            ),
            AppError::Repository(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "HISTORY_ERROR",
                e.to_string(),
            ),
            AppError::Orchestrator(OrchestratorError::WorkerUnavailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ORCHESTRATOR_BUSY",
                "The session worker is unavailable, try again".to_string(),
            ),
            AppError::Orchestrator(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ORCHESTRATOR_ERROR",
                e.to_string(),
            ),
            AppError::SessionNotFound(id) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                format!("Session '{id}' not found"),
            ),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
        };

        // No timing field here: errors can surface before a request timer
        // exists, and a made-up zero would read as a measurement.
        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_envelope_carries_no_timing_field() {
        let response =
            AppError::Validation("content must not be empty".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
        assert!(body["meta"].get("request_id").is_some());
        assert!(body["meta"].get("response_time_ms").is_none());
    }

    #[tokio::test]
    async fn session_not_found_maps_to_404() {
        let response = AppError::SessionNotFound("missing".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

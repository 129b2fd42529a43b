//! Axum router configuration with middleware.
//!
//! REST routes live under `/api/v1/`; the WebSocket endpoint is
//! `/ws/{session_id}`. Middleware: CORS and request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sessions", post(handlers::session::create_session))
        .route("/sessions/{id}", get(handlers::session::get_session))
        .route(
            "/sessions/{id}/history",
            get(handlers::history::get_history),
        )
        .route(
            "/sessions/{id}/messages",
            post(handlers::session::post_message),
        )
        .route("/status", get(handlers::status::get_status));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/{session_id}", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness probe, no state required.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

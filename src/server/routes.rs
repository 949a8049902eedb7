//! Router configuration for the execution engine's HTTP/SSE surface.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Create the engine's router: `StartProcess`, `Subscribe`, `Cancel`, per SPEC_FULL §10.4.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/processes", post(handlers::start_process))
        .route("/processes/:id/events", get(handlers::subscribe))
        .route("/processes/:id/cancel", post(handlers::cancel))
        .route("/processes/:id/status", get(handlers::status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

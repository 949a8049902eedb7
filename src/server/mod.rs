//! HTTP/SSE surface for the execution engine, per SPEC_FULL §10.4.
//!
//! Authentication, session management, and the web UI are out of scope (§1); this is the
//! minimal JSON/SSE surface a client needs to drive the Orchestrator Facade over the
//! network. The owner identity is taken from a header rather than a real auth layer.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

/// Shared state for the web server: just the Orchestrator, the one thing every handler
/// needs. Cheap to clone (single `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Start the HTTP surface, binding `addr` and serving until the process is killed.
pub async fn serve(orchestrator: Arc<Orchestrator>, addr: &str) -> anyhow::Result<()> {
    let state = AppState { orchestrator };
    let app = create_router(state);

    let addr: SocketAddr = addr.parse()?;
    tracing::info!("starting query engine server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

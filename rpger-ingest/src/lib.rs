//! rpger-ingest library interface
//!
//! Exposes the extraction pipeline to the HTTP surface, the CLI, and the
//! integration tests.

pub mod addresser;
pub mod ai;
pub mod api;
pub mod catalog;
pub mod cli;
pub mod confidence;
pub mod dedup;
pub mod enhance;
pub mod identify;
pub mod models;
pub mod novel;
pub mod pdf;
pub mod pipeline;
pub mod store;

pub use api::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;

use pipeline::Orchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The pipeline orchestrator; owns the session registry and event bus
    pub orchestrator: Arc<Orchestrator>,
    /// Startup timestamp for /health uptime
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            startup_time: chrono::Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    use axum::extract::DefaultBodyLimit;
    use axum::routing::get;

    // Axum's default body limit is far below the upload contract
    let body_limit = state.orchestrator.config().upload_max_bytes as usize + 64 * 1024;

    Router::new()
        .merge(api::session_routes())
        .route("/sessions/:id/events", get(api::session_event_stream))
        .merge(api::browse_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::HealthReport;
use crate::AppState;

/// GET /health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" when both stores answer, "degraded" otherwise
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub report: HealthReport,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.orchestrator.health().await;
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    let all_ok = matches!(report.vector_store, crate::store::StoreHealth::Ok)
        && matches!(report.document_store, crate::store::StoreHealth::Ok);

    Json(HealthResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        module: "rpger-ingest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        report,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

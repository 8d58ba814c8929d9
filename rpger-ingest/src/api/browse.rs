//! Collection browsing
//!
//! GET /collections/:store and GET /collections/:store/:name for quick
//! inspection of what an ingest landed in either backing store.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use rpger_common::Error;
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub collection: String,
    pub total: usize,
    pub docs: Vec<serde_json::Value>,
}

/// GET /collections/:store — list collection names
pub async fn list_collections(
    State(state): State<AppState>,
    Path(store): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    let names = match store.as_str() {
        "vector" => state.orchestrator.vector_store().list_collections().await?,
        "document" => {
            state
                .orchestrator
                .document_store()
                .list_collections()
                .await?
        }
        other => {
            return Err(ApiError(Error::BadSession(format!(
                "unknown store: {other} (expected vector|document)"
            ))))
        }
    };
    Ok(Json(names))
}

/// GET /collections/:store/:name — paged documents from one collection
pub async fn browse_collection(
    State(state): State<AppState>,
    Path((store, name)): Path<(String, String)>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<BrowseResponse>> {
    let limit = query.limit.min(200);
    match store.as_str() {
        "vector" => {
            let store = state.orchestrator.vector_store();
            let total = store.count(&name).await?;
            let records = store.sample(&name, query.offset + limit).await?;
            let docs = records
                .into_iter()
                .skip(query.offset)
                .filter_map(|r| serde_json::to_value(r).ok())
                .collect();
            Ok(Json(BrowseResponse {
                collection: name,
                total,
                docs,
            }))
        }
        "document" => {
            let page = state
                .orchestrator
                .document_store()
                .page(&name, query.offset, limit, None)
                .await?;
            Ok(Json(BrowseResponse {
                collection: name,
                total: page.total,
                docs: page.docs,
            }))
        }
        other => Err(ApiError(Error::BadSession(format!(
            "unknown store: {other} (expected vector|document)"
        )))),
    }
}

/// Build browse routes
pub fn browse_routes() -> Router<AppState> {
    Router::new()
        .route("/collections/:store", get(list_collections))
        .route("/collections/:store/:name", get(browse_collection))
}

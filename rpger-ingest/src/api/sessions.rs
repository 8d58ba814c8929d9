//! Session lifecycle handlers
//!
//! POST /sessions, POST /sessions/:id/analyze, POST /sessions/:id/extract,
//! POST /sessions/:id/cancel, GET /sessions/:id, GET /sessions/:id/artifact

use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use rpger_common::events::Stage;
use rpger_common::Error;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use crate::addresser::Layout;
use crate::ai::ProviderKind;
use crate::enhance::EnhanceMode;
use crate::identify::Overrides;
use crate::models::{Artifact, ContentKind, Verdict};
use crate::pipeline::{ExtractOptions, SessionSnapshot};
use crate::AppState;

/// POST /sessions response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub session_id: Uuid,
    pub stage: Stage,
    pub digest: String,
}

/// POST /sessions/:id/analyze request
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_kind")]
    pub kind: ContentKind,
    #[serde(default)]
    pub game: Option<String>,
    #[serde(default)]
    pub edition: Option<String>,
    #[serde(default)]
    pub book: Option<String>,
}

fn default_provider() -> ProviderKind {
    ProviderKind::Mock
}

fn default_kind() -> ContentKind {
    ContentKind::SourceMaterial
}

/// POST /sessions/:id/extract request
#[derive(Debug, Default, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub text_enhance: EnhanceMode,
    #[serde(default)]
    pub layout: Layout,
}

/// POST /sessions/:id/extract response (202-style acknowledgement)
#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub session_id: Uuid,
    pub stage: Stage,
}

/// POST /sessions — multipart upload; creates an `uploaded` session
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let limit = state.orchestrator.config().upload_max_bytes;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(Error::Internal(format!("multipart: {e}"))))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let origin_name = field
            .file_name()
            .unwrap_or("upload.pdf")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError(Error::Internal(format!("multipart read: {e}"))))?;
        if bytes.len() as u64 > limit {
            return Err(ApiError(Error::UploadTooLarge {
                size: bytes.len() as u64,
                limit,
            }));
        }
        file = Some((origin_name, bytes.to_vec()));
        break;
    }

    let (origin_name, bytes) =
        file.ok_or_else(|| ApiError(Error::Internal("no file field in upload".into())))?;
    let session_id = state.orchestrator.upload(bytes, &origin_name).await?;
    let snapshot = state.orchestrator.registry().snapshot(session_id).await?;

    Ok(Json(UploadResponse {
        session_id,
        stage: snapshot.stage,
        digest: snapshot.digest,
    }))
}

/// POST /sessions/:id/analyze — drives to `identified`, returns the verdict
pub async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<Verdict>> {
    let overrides = Overrides {
        game: request.game,
        edition: request.edition,
        book: request.book,
        kind: None,
    };
    let verdict = state
        .orchestrator
        .analyze(id, request.provider, request.kind, &overrides)
        .await?;
    Ok(Json(verdict))
}

/// POST /sessions/:id/extract — spawns the pipeline run
///
/// The run continues in the background; progress arrives on the event
/// stream and the terminal state lands in the session snapshot.
pub async fn extract(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<Json<ExtractResponse>> {
    // Reject unknown sessions synchronously
    let snapshot = state.orchestrator.registry().snapshot(id).await?;
    if snapshot.verdict.is_none() {
        return Err(ApiError(Error::BadSession(format!("{id}: not analyzed"))));
    }

    let opts = ExtractOptions {
        enhance: request.text_enhance,
        layout: request.layout,
    };
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.extract(id, opts).await {
            tracing::warn!(session_id = %id, code = e.code(), error = %e, "Extraction ended in error");
        }
    });

    Ok(Json(ExtractResponse {
        session_id: id,
        stage: Stage::DedupCheck,
    }))
}

/// POST /sessions/:id/cancel — idempotent
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    state.orchestrator.cancel(id).await?;
    let snapshot = state.orchestrator.registry().snapshot(id).await?;
    Ok(Json(snapshot))
}

/// GET /sessions/:id — session snapshot
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.orchestrator.registry().snapshot(id).await?))
}

/// GET /sessions/:id/artifact — the extraction artifact once produced
pub async fn artifact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Artifact>> {
    let artifact = state
        .orchestrator
        .registry()
        .with_session(id, |s| s.artifact.clone())
        .await?;
    artifact
        .map(Json)
        .ok_or_else(|| ApiError(Error::BadSession(format!("{id}: no artifact yet"))))
}

/// Build session lifecycle routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(upload))
        .route("/sessions/:id/analyze", post(analyze))
        .route("/sessions/:id/extract", post(extract))
        .route("/sessions/:id/cancel", post(cancel))
        .route("/sessions/:id", get(status))
        .route("/sessions/:id/artifact", get(artifact))
}

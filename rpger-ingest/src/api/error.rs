//! API error mapping
//!
//! Every terminal error keeps its stable machine code in the JSON body;
//! the HTTP status is derived from the taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rpger_common::Error;
use serde_json::json;

/// API error wrapper around the common taxonomy
#[derive(Debug)]
pub struct ApiError(pub Error);

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::BadSession(_) => StatusCode::NOT_FOUND,
            Error::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::RejectedDuplicate { .. } => StatusCode::CONFLICT,
            Error::PdfUnreadable(_)
            | Error::PdfEncrypted
            | Error::PdfEmpty
            | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::ProviderUnauthorized(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::StoreUnreachable(_) | Error::AiUnreachable(_) | Error::AiTimeout(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

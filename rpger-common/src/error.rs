//! Common error types for rpger
//!
//! Every terminal failure maps to a stable machine-readable code (used by
//! the session API and the CLI exit codes) plus a human message carrying a
//! short remediation hint.

use thiserror::Error;

/// Common result type for rpger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error taxonomy across the ingest pipeline
#[derive(Error, Debug)]
pub enum Error {
    // -- input --
    #[error("PDF is structurally unreadable: {0}")]
    PdfUnreadable(String),

    #[error("PDF is password-protected; decryption is not attempted")]
    PdfEncrypted,

    #[error("PDF contains zero pages")]
    PdfEmpty,

    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    UploadTooLarge { size: u64, limit: u64 },

    #[error("unknown or expired session: {0}")]
    BadSession(String),

    // -- identification --
    #[error("catalog has no entry for {0}; set --game/--edition explicitly")]
    CatalogMissing(String),

    #[error("AI provider returned malformed output: {0}")]
    AiMalformed(String),

    #[error("AI provider unreachable: {0}")]
    AiUnreachable(String),

    #[error("AI provider timed out after {0} ms")]
    AiTimeout(u64),

    #[error("AI provider rejected credentials: {0}; set a provider key")]
    ProviderUnauthorized(String),

    // -- extraction --
    #[error("OCR backend unavailable for page {0}")]
    OcrUnavailable(u32),

    #[error("page {page} failed: {reason}")]
    PageFailed { page: u32, reason: String },

    // -- persistence --
    #[error("store unreachable: {0}")]
    StoreUnreachable(String),

    #[error("store collection conflict: {0}")]
    StoreConflict(String),

    #[error("value exceeds store size limit: {0}")]
    StoreOversize(String),

    // -- duplicates --
    #[error("work already ingested on {first_ingested}: ISBN {isbn}")]
    RejectedDuplicate { isbn: String, first_ingested: String },

    // -- control --
    #[error("cancelled")]
    Cancelled,

    #[error("stage deadline exceeded")]
    DeadlineExceeded,

    // -- ambient --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            Error::PdfUnreadable(_) => "pdf_unreadable",
            Error::PdfEncrypted => "pdf_encrypted",
            Error::PdfEmpty => "pdf_empty",
            Error::UploadTooLarge { .. } => "upload_too_large",
            Error::BadSession(_) => "bad_session",
            Error::CatalogMissing(_) => "catalog_missing",
            Error::AiMalformed(_) => "ai_malformed",
            Error::AiUnreachable(_) => "ai_unreachable",
            Error::AiTimeout(_) => "ai_timeout",
            Error::ProviderUnauthorized(_) => "provider_unauthorized",
            Error::OcrUnavailable(_) => "ocr_unavailable",
            Error::PageFailed { .. } => "page_failed",
            Error::StoreUnreachable(_) => "store_unreachable",
            Error::StoreConflict(_) => "store_conflict",
            Error::StoreOversize(_) => "store_oversize",
            Error::RejectedDuplicate { .. } => "rejected_duplicate",
            Error::Cancelled => "cancelled",
            Error::DeadlineExceeded => "deadline_exceeded",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }

    /// Process exit code for the CLI surface
    ///
    /// 0 success, 2 usage, 3 identification, 4 extraction, 5 persistence,
    /// 6 duplicate rejection, 130 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CatalogMissing(_)
            | Error::AiMalformed(_)
            | Error::AiUnreachable(_)
            | Error::AiTimeout(_)
            | Error::ProviderUnauthorized(_) => 3,
            Error::PdfUnreadable(_)
            | Error::PdfEncrypted
            | Error::PdfEmpty
            | Error::OcrUnavailable(_)
            | Error::PageFailed { .. }
            | Error::DeadlineExceeded => 4,
            Error::StoreUnreachable(_) | Error::StoreConflict(_) | Error::StoreOversize(_) => 5,
            Error::RejectedDuplicate { .. } => 6,
            Error::Cancelled => 130,
            Error::UploadTooLarge { .. } | Error::BadSession(_) | Error::Config(_) => 2,
            _ => 1,
        }
    }
}

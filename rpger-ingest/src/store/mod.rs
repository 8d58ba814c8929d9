//! Backing-store adapters
//!
//! Typed operations over the vector index and the document store. The
//! concrete network clients are external collaborators; these traits
//! pin down only the operations the core requires. Each trait ships an
//! HTTP implementation and an in-memory implementation — the latter is
//! what the test suite drives and what a degraded deployment falls back
//! to.

mod document;
mod vector;

pub use document::{DocumentStore, HttpDocumentStore, MemoryDocumentStore};
pub use vector::{HttpVectorStore, MemoryVectorStore, VectorStore};

use serde::{Deserialize, Serialize};

/// Store operation timeout
pub const STORE_TIMEOUT_SECS: u64 = 10;
/// HTTP connection pool size per adapter
pub const STORE_POOL_SIZE: usize = 8;

/// One record upserted into a vector collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// `{collection}_page{page}_{ordinal}`; upserts are idempotent by id
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// Paged read result from the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub docs: Vec<serde_json::Value>,
    pub total: usize,
}

/// Health of one backing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreHealth {
    Ok,
    Degraded,
    Down,
}

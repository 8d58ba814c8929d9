//! Vector store adapter
//!
//! HTTP implementation speaks a Chroma-style REST surface; the memory
//! implementation is the reference semantics used by tests and
//! store-less runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rpger_common::{Error, Result};
use serde_json::json;
use tokio::sync::RwLock;

use super::{StoreHealth, VectorRecord, STORE_POOL_SIZE, STORE_TIMEOUT_SECS};

/// Typed vector-store operations the core requires
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent; creating an existing collection
    /// is not an error
    async fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Upsert records; idempotent by record id
    async fn upsert_sections(&self, name: &str, records: &[VectorRecord]) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn sample(&self, name: &str, limit: usize) -> Result<Vec<VectorRecord>>;

    async fn count(&self, name: &str) -> Result<usize>;

    async fn ping(&self) -> StoreHealth;
}

// ============================================================================
// HTTP implementation (Chroma-style REST)
// ============================================================================

pub struct HttpVectorStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpVectorStore {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(STORE_TIMEOUT_SECS))
            .pool_max_idle_per_host(STORE_POOL_SIZE)
            .build()
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> Error {
        match status.as_u16() {
            409 => Error::StoreConflict(body),
            413 => Error::StoreOversize(body),
            _ => Error::StoreUnreachable(format!("HTTP {status}: {body}")),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::map_status(status, body))
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url("collections"))
            .json(&json!({"name": name, "get_or_create": true}))
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert_sections(&self, name: &str, records: &[VectorRecord]) -> Result<()> {
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let documents: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let metadatas: Vec<&serde_json::Value> = records.iter().map(|r| &r.metadata).collect();
        let response = self
            .http
            .post(self.url(&format!("collections/{name}/upsert")))
            .json(&json!({"ids": ids, "documents": documents, "metadatas": metadatas}))
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        Self::check(response).await?;
        tracing::debug!(collection = name, records = records.len(), "Vector upsert");
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.url("collections"))
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        let body: Vec<serde_json::Value> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        Ok(body
            .into_iter()
            .filter_map(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .collect())
    }

    async fn sample(&self, name: &str, limit: usize) -> Result<Vec<VectorRecord>> {
        let response = self
            .http
            .post(self.url(&format!("collections/{name}/get")))
            .json(&json!({"limit": limit, "include": ["documents", "metadatas"]}))
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        let body: serde_json::Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;

        let ids = as_string_vec(&body["ids"]);
        let documents = as_string_vec(&body["documents"]);
        let metadatas = body["metadatas"].as_array().cloned().unwrap_or_default();

        Ok(ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| VectorRecord {
                id,
                text: documents.get(i).cloned().unwrap_or_default(),
                metadata: metadatas.get(i).cloned().unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let response = self
            .http
            .get(self.url(&format!("collections/{name}/count")))
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        Self::check(response)
            .await?
            .json::<usize>()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))
    }

    async fn ping(&self) -> StoreHealth {
        match self.http.get(self.url("heartbeat")).send().await {
            Ok(r) if r.status().is_success() => StoreHealth::Ok,
            Ok(_) => StoreHealth::Degraded,
            Err(_) => StoreHealth::Down,
        }
    }
}

fn as_string_vec(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// In-memory vector store; idempotent upserts keyed by record id
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<VectorRecord>>>,
    offline: AtomicBool,
    /// Per-value size limit; values above it yield `store_oversize`
    value_limit: Option<usize>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value_limit(limit: usize) -> Self {
        Self {
            value_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Simulate an outage; all operations return `store_unreachable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::StoreUnreachable("memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.gate()?;
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert_sections(&self, name: &str, records: &[VectorRecord]) -> Result<()> {
        self.gate()?;
        if let Some(limit) = self.value_limit {
            if let Some(too_big) = records.iter().find(|r| r.text.len() > limit) {
                return Err(Error::StoreOversize(format!(
                    "record {} is {} bytes, limit {}",
                    too_big.id,
                    too_big.text.len(),
                    limit
                )));
            }
        }
        let mut collections = self.collections.write().await;
        let coll = collections.entry(name.to_string()).or_default();
        for record in records {
            match coll.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => coll.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.gate()?;
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn sample(&self, name: &str, limit: usize) -> Result<Vec<VectorRecord>> {
        self.gate()?;
        Ok(self
            .collections
            .read()
            .await
            .get(name)
            .map(|c| c.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, name: &str) -> Result<usize> {
        self.gate()?;
        Ok(self
            .collections
            .read()
            .await
            .get(name)
            .map(Vec::len)
            .unwrap_or(0))
    }

    async fn ping(&self) -> StoreHealth {
        if self.offline.load(Ordering::SeqCst) {
            StoreHealth::Down
        } else {
            StoreHealth::Ok
        }
    }
}

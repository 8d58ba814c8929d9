//! Document store adapter
//!
//! HTTP implementation speaks a small data-API surface
//! (`/collections/{name}/...`); the memory implementation carries the
//! reference semantics. Documents are open JSON objects keyed by `_id`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rpger_common::{Error, Result};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{Page, StoreHealth, STORE_POOL_SIZE, STORE_TIMEOUT_SECS};

/// Typed document-store operations the core requires
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Insert one whole-artifact document; returns its id
    async fn insert_whole(&self, name: &str, doc: Value) -> Result<String>;

    /// Insert split-section documents; returns their ids
    async fn insert_split(&self, name: &str, docs: Vec<Value>) -> Result<Vec<String>>;

    /// Paged read; `filter` matches on equal top-level fields
    async fn page(&self, name: &str, offset: usize, limit: usize, filter: Option<Value>)
        -> Result<Page>;

    /// Case-insensitive substring search over string fields
    async fn search_text(&self, name: &str, query: &str, limit: usize) -> Result<Vec<Value>>;

    /// Fetch one document by id
    async fn find_one(&self, name: &str, id: &str) -> Result<Option<Value>>;

    /// Insert or replace one document by id
    async fn upsert_one(&self, name: &str, id: &str, doc: Value) -> Result<()>;

    /// Delete one document by id; deleting a missing id is not an error
    async fn delete_one(&self, name: &str, id: &str) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn ping(&self) -> StoreHealth;
}

/// Pull `_id` from a document, minting one when absent
fn doc_id(doc: &Value) -> String {
    doc.get("_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct HttpDocumentStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDocumentStore {
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
        format!("{}/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            409 => Error::StoreConflict(body),
            413 => Error::StoreOversize(body),
            _ => Error::StoreUnreachable(format!("HTTP {status}: {body}")),
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.post_json("collections", &json!({"name": name, "get_or_create": true}))
            .await?;
        Ok(())
    }

    async fn insert_whole(&self, name: &str, doc: Value) -> Result<String> {
        let id = doc_id(&doc);
        self.post_json(&format!("collections/{name}/documents"), &doc)
            .await?;
        tracing::debug!(collection = name, id = %id, "Whole-document insert");
        Ok(id)
    }

    async fn insert_split(&self, name: &str, docs: Vec<Value>) -> Result<Vec<String>> {
        let ids: Vec<String> = docs.iter().map(doc_id).collect();
        self.post_json(
            &format!("collections/{name}/documents/batch"),
            &json!({"documents": docs}),
        )
        .await?;
        tracing::debug!(collection = name, count = ids.len(), "Split-document insert");
        Ok(ids)
    }

    async fn page(
        &self,
        name: &str,
        offset: usize,
        limit: usize,
        filter: Option<Value>,
    ) -> Result<Page> {
        let body = self
            .post_json(
                &format!("collections/{name}/find"),
                &json!({"offset": offset, "limit": limit, "filter": filter}),
            )
            .await?;
        Ok(Page {
            docs: body["docs"].as_array().cloned().unwrap_or_default(),
            total: body["total"].as_u64().unwrap_or(0) as usize,
        })
    }

    async fn search_text(&self, name: &str, query: &str, limit: usize) -> Result<Vec<Value>> {
        let body = self
            .post_json(
                &format!("collections/{name}/search"),
                &json!({"query": query, "limit": limit}),
            )
            .await?;
        Ok(body["docs"].as_array().cloned().unwrap_or_default())
    }

    async fn find_one(&self, name: &str, id: &str) -> Result<Option<Value>> {
        let response = self
            .http
            .get(self.url(&format!("collections/{name}/documents/{id}")))
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(|e| Error::StoreUnreachable(e.to_string()))
    }

    async fn upsert_one(&self, name: &str, id: &str, doc: Value) -> Result<()> {
        let response = self
            .http
            .put(self.url(&format!("collections/{name}/documents/{id}")))
            .json(&doc)
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_one(&self, name: &str, id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("collections/{name}/documents/{id}")))
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.url("collections"))
            .send()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        let body: Vec<Value> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::StoreUnreachable(e.to_string()))?;
        Ok(body
            .into_iter()
            .filter_map(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .collect())
    }

    async fn ping(&self) -> StoreHealth {
        match self.http.get(self.url("health")).send().await {
            Ok(r) if r.status().is_success() => StoreHealth::Ok,
            Ok(_) => StoreHealth::Degraded,
            Err(_) => StoreHealth::Down,
        }
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    offline: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
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

fn matches_filter(doc: &Value, filter: &Value) -> bool {
    let Some(fields) = filter.as_object() else {
        return true;
    };
    fields.iter().all(|(k, v)| doc.get(k) == Some(v))
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| value_contains(v, needle)),
        Value::Object(map) => map.values().any(|v| value_contains(v, needle)),
        _ => false,
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.gate()?;
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn insert_whole(&self, name: &str, mut doc: Value) -> Result<String> {
        self.gate()?;
        let id = doc_id(&doc);
        if let Some(map) = doc.as_object_mut() {
            map.insert("_id".into(), Value::String(id.clone()));
        }
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .push(doc);
        Ok(id)
    }

    async fn insert_split(&self, name: &str, docs: Vec<Value>) -> Result<Vec<String>> {
        self.gate()?;
        let mut ids = Vec::with_capacity(docs.len());
        let mut collections = self.collections.write().await;
        let coll = collections.entry(name.to_string()).or_default();
        for mut doc in docs {
            let id = doc_id(&doc);
            if let Some(map) = doc.as_object_mut() {
                map.insert("_id".into(), Value::String(id.clone()));
            }
            // Idempotent by _id, matching the vector adapter's contract
            match coll
                .iter_mut()
                .find(|d| d.get("_id").and_then(|v| v.as_str()) == Some(id.as_str()))
            {
                Some(existing) => *existing = doc,
                None => coll.push(doc),
            }
            ids.push(id);
        }
        Ok(ids)
    }

    async fn page(
        &self,
        name: &str,
        offset: usize,
        limit: usize,
        filter: Option<Value>,
    ) -> Result<Page> {
        self.gate()?;
        let collections = self.collections.read().await;
        let all: Vec<&Value> = collections
            .get(name)
            .map(|c| {
                c.iter()
                    .filter(|d| filter.as_ref().map_or(true, |f| matches_filter(d, f)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Page {
            total: all.len(),
            docs: all.into_iter().skip(offset).take(limit).cloned().collect(),
        })
    }

    async fn search_text(&self, name: &str, query: &str, limit: usize) -> Result<Vec<Value>> {
        self.gate()?;
        let needle = query.to_lowercase();
        Ok(self
            .collections
            .read()
            .await
            .get(name)
            .map(|c| {
                c.iter()
                    .filter(|d| value_contains(d, &needle))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, name: &str, id: &str) -> Result<Option<Value>> {
        self.gate()?;
        Ok(self.collections.read().await.get(name).and_then(|c| {
            c.iter()
                .find(|d| d.get("_id").and_then(|v| v.as_str()) == Some(id))
                .cloned()
        }))
    }

    async fn upsert_one(&self, name: &str, id: &str, mut doc: Value) -> Result<()> {
        self.gate()?;
        if let Some(map) = doc.as_object_mut() {
            map.insert("_id".into(), Value::String(id.to_string()));
        }
        let mut collections = self.collections.write().await;
        let coll = collections.entry(name.to_string()).or_default();
        match coll
            .iter_mut()
            .find(|d| d.get("_id").and_then(|v| v.as_str()) == Some(id))
        {
            Some(existing) => *existing = doc,
            None => coll.push(doc),
        }
        Ok(())
    }

    async fn delete_one(&self, name: &str, id: &str) -> Result<()> {
        self.gate()?;
        if let Some(coll) = self.collections.write().await.get_mut(name) {
            coll.retain(|d| d.get("_id").and_then(|v| v.as_str()) != Some(id));
        }
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.gate()?;
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn ping(&self) -> StoreHealth {
        if self.offline.load(Ordering::SeqCst) {
            StoreHealth::Down
        } else {
            StoreHealth::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn whole_insert_assigns_and_returns_an_id() {
        let store = MemoryDocumentStore::new();
        store.ensure_collection("rpger").await.unwrap();
        let id = store
            .insert_whole("rpger", json!({"game_metadata": {"game": "dnd"}}))
            .await
            .unwrap();
        let found = store.find_one("rpger", &id).await.unwrap().unwrap();
        assert_eq!(found["game_metadata"]["game"], "dnd");
    }

    #[tokio::test]
    async fn page_filters_and_counts() {
        let store = MemoryDocumentStore::new();
        for i in 0..5 {
            store
                .insert_whole("c", json!({"_id": format!("d{i}"), "category": if i % 2 == 0 { "Combat" } else { "Magic" }}))
                .await
                .unwrap();
        }
        let page = store
            .page("c", 0, 10, Some(json!({"category": "Combat"})))
            .await
            .unwrap();
        assert_eq!(page.total, 3);

        let second = store.page("c", 1, 1, Some(json!({"category": "Combat"}))).await.unwrap();
        assert_eq!(second.docs.len(), 1);
        assert_eq!(second.total, 3);
    }

    #[tokio::test]
    async fn search_matches_nested_strings() {
        let store = MemoryDocumentStore::new();
        store
            .insert_whole("c", json!({"_id": "a", "content": "the beholder attacks"}))
            .await
            .unwrap();
        store
            .insert_whole("c", json!({"_id": "b", "content": "a quiet village"}))
            .await
            .unwrap();
        let hits = store.search_text("c", "BEHOLDER", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["_id"], "a");
    }

    #[tokio::test]
    async fn delete_missing_is_not_an_error() {
        let store = MemoryDocumentStore::new();
        store.ensure_collection("c").await.unwrap();
        store.delete_one("c", "missing").await.unwrap();
    }
}

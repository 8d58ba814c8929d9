//! Duplicate registry
//!
//! Persisted set of previously-ingested work identifiers, keyed by
//! canonical ISBN-13 and stored as one document per ISBN in the document
//! store's `registry` collection. Operations on one ISBN are serialized
//! through an in-process mutex table so two concurrent ingests of the
//! same book cannot both pass the check.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rpger_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::store::DocumentStore;

/// Registry collection name in the document store
pub const REGISTRY_COLLECTION: &str = "registry";
/// Bound on acquiring a per-ISBN lock before yielding `store_unreachable`
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle status of a registry entry
///
/// `Tentative` exists only between `dedup_check` and the session's
/// terminal state; durable entries are `Completed` or `Superseded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    Tentative,
    Completed,
    Superseded,
}

/// One previously-ingested work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Canonical ISBN-13
    pub isbn: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub first_ingested_at: DateTime<Utc>,
    pub last_session_id: Uuid,
    pub sections: usize,
    pub words: usize,
    pub status: RegistryStatus,
}

/// Outcome of the dedup check at the head of a pipeline run
#[derive(Debug, Clone)]
pub enum DedupOutcome {
    /// No prior entry; a tentative entry now holds the slot
    Fresh,
    /// A prior ingest exists; the session must reject
    Duplicate(RegistryEntry),
    /// The verdict carried no ISBN, so the registry has nothing to key on
    NoIsbn,
}

pub struct DuplicateRegistry {
    store: Arc<dyn DocumentStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DuplicateRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a canonical ISBN
    pub async fn lookup(&self, canonical_isbn: &str) -> Result<Option<RegistryEntry>> {
        let doc = self.store.find_one(REGISTRY_COLLECTION, canonical_isbn).await?;
        doc.map(|d| {
            serde_json::from_value(d)
                .map_err(|e| Error::Internal(format!("corrupt registry entry: {e}")))
        })
        .transpose()
    }

    /// Serialize on the ISBN, check for a prior ingest, and write the
    /// tentative entry when the slot is free
    ///
    /// The lock is held only across check-plus-write: once a tentative
    /// entry exists, later callers see it in the lookup and reject
    /// without needing the lock.
    pub async fn check_and_claim(
        &self,
        canonical_isbn: &str,
        title: &str,
        session_id: Uuid,
    ) -> Result<DedupOutcome> {
        let lock = self.lock_for(canonical_isbn).await;
        let guard = tokio::time::timeout(LOCK_TIMEOUT, lock.lock())
            .await
            .map_err(|_| {
                Error::StoreUnreachable(format!(
                    "registry lock for {canonical_isbn} not acquired within 5s"
                ))
            })?;

        if let Some(entry) = self.lookup(canonical_isbn).await? {
            tracing::info!(
                isbn = canonical_isbn,
                first_ingested = %entry.first_ingested_at,
                status = ?entry.status,
                "Duplicate work detected"
            );
            return Ok(DedupOutcome::Duplicate(entry));
        }

        let entry = RegistryEntry {
            isbn: canonical_isbn.to_string(),
            title: title.to_string(),
            author: None,
            first_ingested_at: Utc::now(),
            last_session_id: session_id,
            sections: 0,
            words: 0,
            status: RegistryStatus::Tentative,
        };
        self.write(&entry).await?;
        drop(guard);

        tracing::debug!(isbn = canonical_isbn, session_id = %session_id, "Tentative registry entry written");
        Ok(DedupOutcome::Fresh)
    }

    /// Finalize the entry at `completed`, recording the artifact counts
    pub async fn finalize(
        &self,
        canonical_isbn: &str,
        sections: usize,
        words: usize,
    ) -> Result<()> {
        let Some(mut entry) = self.lookup(canonical_isbn).await? else {
            return Err(Error::Internal(format!(
                "finalize for unknown registry entry {canonical_isbn}"
            )));
        };
        entry.sections = sections;
        entry.words = words;
        entry.status = RegistryStatus::Completed;
        self.write(&entry).await
    }

    /// Roll back a tentative entry after a terminal failure or
    /// cancellation
    ///
    /// Deletes only an entry this session claimed: a completed entry, or
    /// a tentative entry belonging to a concurrent session, is left
    /// alone.
    pub async fn drop_tentative(&self, canonical_isbn: &str, session_id: Uuid) -> Result<()> {
        match self.lookup(canonical_isbn).await? {
            Some(entry)
                if entry.status == RegistryStatus::Tentative
                    && entry.last_session_id == session_id =>
            {
                self.store
                    .delete_one(REGISTRY_COLLECTION, canonical_isbn)
                    .await?;
                tracing::debug!(isbn = canonical_isbn, "Tentative registry entry rolled back");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn write(&self, entry: &RegistryEntry) -> Result<()> {
        self.store.ensure_collection(REGISTRY_COLLECTION).await?;
        let doc = serde_json::to_value(entry)
            .map_err(|e| Error::Internal(format!("serialize registry entry: {e}")))?;
        self.store
            .upsert_one(REGISTRY_COLLECTION, &entry.isbn, doc)
            .await
    }

    async fn lock_for(&self, isbn: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(isbn.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    fn registry() -> DuplicateRegistry {
        DuplicateRegistry::new(Arc::new(MemoryDocumentStore::new()))
    }

    #[tokio::test]
    async fn fresh_isbn_claims_a_tentative_slot() {
        let reg = registry();
        let outcome = reg
            .check_and_claim("9780306406157", "Player's Handbook", Uuid::new_v4())
            .await
            .unwrap();
        assert!(matches!(outcome, DedupOutcome::Fresh));

        let entry = reg.lookup("9780306406157").await.unwrap().unwrap();
        assert_eq!(entry.status, RegistryStatus::Tentative);
    }

    #[tokio::test]
    async fn second_claim_sees_the_duplicate() {
        let reg = registry();
        reg.check_and_claim("9780306406157", "PHB", Uuid::new_v4())
            .await
            .unwrap();
        let outcome = reg
            .check_and_claim("9780306406157", "PHB", Uuid::new_v4())
            .await
            .unwrap();
        assert!(matches!(outcome, DedupOutcome::Duplicate(_)));
    }

    #[tokio::test]
    async fn finalize_records_counts_and_completes() {
        let reg = registry();
        reg.check_and_claim("9780306406157", "PHB", Uuid::new_v4())
            .await
            .unwrap();
        reg.finalize("9780306406157", 120, 54000).await.unwrap();

        let entry = reg.lookup("9780306406157").await.unwrap().unwrap();
        assert_eq!(entry.status, RegistryStatus::Completed);
        assert_eq!(entry.sections, 120);
        assert_eq!(entry.words, 54000);
    }

    #[tokio::test]
    async fn drop_tentative_spares_completed_entries() {
        let reg = registry();
        let session = Uuid::new_v4();
        reg.check_and_claim("9780306406157", "PHB", session)
            .await
            .unwrap();
        reg.finalize("9780306406157", 1, 1).await.unwrap();

        reg.drop_tentative("9780306406157", session).await.unwrap();
        assert!(reg.lookup("9780306406157").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn drop_tentative_rolls_back_unfinished_claims() {
        let reg = registry();
        let session = Uuid::new_v4();
        reg.check_and_claim("9780306406157", "PHB", session)
            .await
            .unwrap();
        reg.drop_tentative("9780306406157", session).await.unwrap();
        assert!(reg.lookup("9780306406157").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn drop_tentative_spares_another_sessions_claim() {
        let reg = registry();
        let owner = Uuid::new_v4();
        reg.check_and_claim("9780306406157", "PHB", owner)
            .await
            .unwrap();

        // A rejected concurrent session must not evict the owner's claim
        reg.drop_tentative("9780306406157", Uuid::new_v4())
            .await
            .unwrap();
        assert!(reg.lookup("9780306406157").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_claims_admit_exactly_one() {
        let reg = Arc::new(registry());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                reg.check_and_claim("9780306406157", "PHB", Uuid::new_v4())
                    .await
                    .unwrap()
            }));
        }
        let mut fresh = 0;
        let mut duplicate = 0;
        for handle in handles {
            match handle.await.unwrap() {
                DedupOutcome::Fresh => fresh += 1,
                DedupOutcome::Duplicate(_) => duplicate += 1,
                DedupOutcome::NoIsbn => unreachable!(),
            }
        }
        assert_eq!(fresh, 1);
        assert_eq!(duplicate, 7);
    }
}

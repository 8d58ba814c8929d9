//! Session registry
//!
//! The sole shared mutable state in the process: a concurrent map from
//! session id to session state, cancellation token, and the latest
//! event per stage (kept for replay to late subscribers). A background
//! sweeper evicts sessions whose `last_touched_at` exceeds the TTL, but
//! never sessions still running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rpger_common::events::{SessionEvent, Stage};
use rpger_common::{Error, Result};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::session::{ExtractionSession, SessionSnapshot};
use crate::models::Document;

struct SessionSlot {
    session: ExtractionSession,
    cancel: CancellationToken,
    /// Latest event per stage, in stage order, for replay on re-subscribe
    latest_events: Vec<SessionEvent>,
}

#[derive(Default)]
pub struct SessionRegistry {
    slots: RwLock<HashMap<Uuid, SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session owning the document; returns its id
    pub async fn create(&self, document: Document) -> Uuid {
        let session = ExtractionSession::new(document);
        let id = session.id;
        self.slots.write().await.insert(
            id,
            SessionSlot {
                session,
                cancel: CancellationToken::new(),
                latest_events: Vec::new(),
            },
        );
        tracing::info!(session_id = %id, "Session created");
        id
    }

    /// Run a closure over a session's mutable state
    pub async fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut ExtractionSession) -> T,
    ) -> Result<T> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or_else(|| Error::BadSession(id.to_string()))?;
        Ok(f(&mut slot.session))
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot> {
        let slots = self.slots.read().await;
        slots
            .get(&id)
            .map(|s| s.session.snapshot())
            .ok_or_else(|| Error::BadSession(id.to_string()))
    }

    /// Recent sessions, newest first
    pub async fn recent(&self, limit: usize) -> Vec<SessionSnapshot> {
        let slots = self.slots.read().await;
        let mut snapshots: Vec<SessionSnapshot> =
            slots.values().map(|s| s.session.snapshot()).collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots.truncate(limit);
        snapshots
    }

    pub async fn cancel_token(&self, id: Uuid) -> Result<CancellationToken> {
        let slots = self.slots.read().await;
        slots
            .get(&id)
            .map(|s| s.cancel.clone())
            .ok_or_else(|| Error::BadSession(id.to_string()))
    }

    /// Request cancellation; idempotent and safe at any time
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        let slots = self.slots.read().await;
        let slot = slots
            .get(&id)
            .ok_or_else(|| Error::BadSession(id.to_string()))?;
        slot.cancel.cancel();
        tracing::info!(session_id = %id, "Cancellation requested");
        Ok(())
    }

    /// Record an event for replay, keeping only the latest per stage
    pub async fn record_event(&self, event: &SessionEvent) {
        let id = event.session_id();
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get_mut(&id) else {
            return;
        };
        let stage = event_stage(event);
        slot.latest_events.retain(|e| event_stage(e) != stage);
        slot.latest_events.push(event.clone());
        slot.latest_events
            .sort_by_key(|e| event_stage(e).map(Stage::index).unwrap_or(u8::MAX));
    }

    /// Latest per-stage events for a session, in stage order
    pub async fn replay(&self, id: Uuid) -> Result<Vec<SessionEvent>> {
        let slots = self.slots.read().await;
        slots
            .get(&id)
            .map(|s| s.latest_events.clone())
            .ok_or_else(|| Error::BadSession(id.to_string()))
    }

    /// Evict terminal sessions idle past the TTL
    pub async fn sweep(&self, ttl: Duration) -> usize {
        let now = chrono::Utc::now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|id, slot| {
            let idle = now - slot.session.last_touched_at;
            let expired = slot.session.is_terminal()
                && idle.num_seconds() >= 0
                && idle.to_std().map_or(false, |d| d >= ttl);
            if expired {
                tracing::debug!(session_id = %id, "Sweeping expired session");
            }
            !expired
        });
        before - slots.len()
    }

    /// Run the sweeper forever at a fixed cadence
    pub async fn run_sweeper(self: Arc<Self>, ttl_seconds: u64) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let swept = self.sweep(Duration::from_secs(ttl_seconds)).await;
            if swept > 0 {
                tracing::info!(swept, "Session sweeper evicted expired sessions");
            }
        }
    }
}

fn event_stage(event: &SessionEvent) -> Option<Stage> {
    match event {
        SessionEvent::StageChanged { stage, .. } | SessionEvent::Progress { stage, .. } => {
            Some(*stage)
        }
        SessionEvent::Completed { .. } => Some(Stage::Completed),
        SessionEvent::Failed { stage, .. } => Some(*stage),
        SessionEvent::DuplicateRejected { .. } => Some(Stage::RejectedDuplicate),
        SessionEvent::SessionCancelled { .. } => Some(Stage::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpger_common::events::Stage;

    fn doc() -> Document {
        Document::new("a.pdf", b"bytes".to_vec())
    }

    #[tokio::test]
    async fn unknown_session_is_bad_session() {
        let registry = SessionRegistry::new();
        let err = registry.snapshot(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "bad_session");
    }

    #[tokio::test]
    async fn replay_keeps_the_latest_event_per_stage() {
        let registry = SessionRegistry::new();
        let id = registry.create(doc()).await;
        for percent in [10u8, 60] {
            registry
                .record_event(&SessionEvent::Progress {
                    session_id: id,
                    stage: Stage::Extracting,
                    percent,
                    note: None,
                    timestamp: chrono::Utc::now(),
                })
                .await;
        }
        registry
            .record_event(&SessionEvent::Progress {
                session_id: id,
                stage: Stage::Enhancing,
                percent: 5,
                note: None,
                timestamp: chrono::Utc::now(),
            })
            .await;

        let replayed = registry.replay(id).await.unwrap();
        assert_eq!(replayed.len(), 2);
        match &replayed[0] {
            SessionEvent::Progress { stage, percent, .. } => {
                assert_eq!(*stage, Stage::Extracting);
                assert_eq!(*percent, 60);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn sweeper_spares_running_sessions() {
        let registry = SessionRegistry::new();
        let running = registry.create(doc()).await;
        let finished = registry.create(doc()).await;
        registry
            .with_session(finished, |s| {
                s.transition_to(Stage::Identifying);
                s.fail(Stage::FailedIdentification, "ai_unreachable", "down".into());
                // Backdate so the TTL has elapsed
                s.last_touched_at = chrono::Utc::now() - chrono::Duration::seconds(7200);
            })
            .await
            .unwrap();

        let swept = registry.sweep(Duration::from_secs(3600)).await;
        assert_eq!(swept, 1);
        assert!(registry.snapshot(running).await.is_ok());
        assert!(registry.snapshot(finished).await.is_err());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let registry = SessionRegistry::new();
        let id = registry.create(doc()).await;
        registry.cancel(id).await.unwrap();
        registry.cancel(id).await.unwrap();
        assert!(registry.cancel_token(id).await.unwrap().is_cancelled());
    }
}

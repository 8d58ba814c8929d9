//! Event types for the rpger session event system
//!
//! Sessions broadcast [`SessionEvent`]s on an [`EventBus`]; the HTTP SSE
//! surface and the CLI both subscribe to the same channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline stage of an extraction session
///
/// Ordering matters: stage indices are monotone along any session trace
/// and terminal stages are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Uploaded,
    Identifying,
    Identified,
    DedupCheck,
    Extracting,
    Enhancing,
    Categorizing,
    Scoring,
    NovelCharacters,
    Persisting,
    Completed,
    FailedIdentification,
    FailedExtraction,
    FailedPersistence,
    RejectedDuplicate,
    Cancelled,
}

impl Stage {
    /// Position along the happy path; error stages share the terminal rank
    pub fn index(self) -> u8 {
        match self {
            Stage::Created => 0,
            Stage::Uploaded => 1,
            Stage::Identifying => 2,
            Stage::Identified => 3,
            Stage::DedupCheck => 4,
            Stage::Extracting => 5,
            Stage::Enhancing => 6,
            Stage::Categorizing => 7,
            Stage::Scoring => 8,
            Stage::NovelCharacters => 9,
            Stage::Persisting => 10,
            Stage::Completed
            | Stage::FailedIdentification
            | Stage::FailedExtraction
            | Stage::FailedPersistence
            | Stage::RejectedDuplicate
            | Stage::Cancelled => 11,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::Completed
                | Stage::FailedIdentification
                | Stage::FailedExtraction
                | Stage::FailedPersistence
                | Stage::RejectedDuplicate
                | Stage::Cancelled
        )
    }

    /// Brief description of what this stage does
    pub fn description(self) -> &'static str {
        match self {
            Stage::Created => "Session created",
            Stage::Uploaded => "Document received and digested",
            Stage::Identifying => "Classifying game system and book",
            Stage::Identified => "Classification verdict produced",
            Stage::DedupCheck => "Checking previously-ingested works",
            Stage::Extracting => "Extracting page text and tables",
            Stage::Enhancing => "Cleaning OCR artifacts and spelling",
            Stage::Categorizing => "Categorizing sections",
            Stage::Scoring => "Computing confidence scores",
            Stage::NovelCharacters => "Discovering novel characters",
            Stage::Persisting => "Writing to vector and document stores",
            Stage::Completed => "Extraction completed",
            Stage::FailedIdentification => "Identification failed",
            Stage::FailedExtraction => "Extraction failed",
            Stage::FailedPersistence => "Persistence failed",
            Stage::RejectedDuplicate => "Rejected as a duplicate work",
            Stage::Cancelled => "Cancelled by caller",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        write!(f, "{}", s)
    }
}

/// rpger session event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session entered a new stage
    StageChanged {
        session_id: Uuid,
        stage: Stage,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Progress within the current stage; percent is monotone per stage
    Progress {
        session_id: Uuid,
        stage: Stage,
        percent: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached `completed`
    Completed {
        session_id: Uuid,
        sections: usize,
        words: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reached a `failed_*` terminal stage
    Failed {
        session_id: Uuid,
        stage: Stage,
        code: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session rejected as a duplicate of a previously-ingested work
    DuplicateRejected {
        session_id: Uuid,
        isbn: String,
        first_ingested: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session cancelled by the caller
    SessionCancelled {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SessionEvent {
    /// Get event type as string for SSE filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::StageChanged { .. } => "StageChanged",
            SessionEvent::Progress { .. } => "Progress",
            SessionEvent::Completed { .. } => "Completed",
            SessionEvent::Failed { .. } => "Failed",
            SessionEvent::DuplicateRejected { .. } => "DuplicateRejected",
            SessionEvent::SessionCancelled { .. } => "SessionCancelled",
        }
    }

    /// Session this event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::StageChanged { session_id, .. }
            | SessionEvent::Progress { session_id, .. }
            | SessionEvent::Completed { session_id, .. }
            | SessionEvent::Failed { session_id, .. }
            | SessionEvent::DuplicateRejected { session_id, .. }
            | SessionEvent::SessionCancelled { session_id, .. } => *session_id,
        }
    }

    /// Whether this event ends the session's event stream
    pub fn is_terminal(&self) -> bool {
        match self {
            SessionEvent::Completed { .. }
            | SessionEvent::Failed { .. }
            | SessionEvent::DuplicateRejected { .. }
            | SessionEvent::SessionCancelled { .. } => true,
            SessionEvent::StageChanged { stage, .. } => stage.is_terminal(),
            SessionEvent::Progress { .. } => false,
        }
    }
}

/// Broadcast bus for session events
///
/// Slow subscribers may drop events (broadcast lag) but never observe
/// them out of order.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Send an event; a send with no subscribers is not an error
    pub fn send(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_indices_are_monotone_on_happy_path() {
        let path = [
            Stage::Created,
            Stage::Uploaded,
            Stage::Identifying,
            Stage::Identified,
            Stage::DedupCheck,
            Stage::Extracting,
            Stage::Enhancing,
            Stage::Categorizing,
            Stage::Scoring,
            Stage::NovelCharacters,
            Stage::Persisting,
            Stage::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].index() < pair[1].index(), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_stages_are_absorbing_rank() {
        for stage in [
            Stage::Completed,
            Stage::FailedIdentification,
            Stage::FailedExtraction,
            Stage::FailedPersistence,
            Stage::RejectedDuplicate,
            Stage::Cancelled,
        ] {
            assert!(stage.is_terminal());
            assert_eq!(stage.index(), 11);
        }
    }

    #[tokio::test]
    async fn bus_delivers_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        for percent in [10u8, 40, 90] {
            bus.send(SessionEvent::Progress {
                session_id: id,
                stage: Stage::Extracting,
                percent,
                note: None,
                timestamp: chrono::Utc::now(),
            });
        }
        let mut seen = Vec::new();
        for _ in 0..3 {
            if let SessionEvent::Progress { percent, .. } = rx.recv().await.unwrap() {
                seen.push(percent);
            }
        }
        assert_eq!(seen, vec![10, 40, 90]);
    }
}

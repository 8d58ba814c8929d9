//! Extraction session state machine
//!
//! A session carries one document from upload to a terminal state. Stage
//! transitions never regress and `percent` is monotone within a stage;
//! both invariants are enforced here rather than trusted to callers.

use chrono::{DateTime, Utc};
use rpger_common::events::Stage;
use serde::Serialize;
use uuid::Uuid;

use crate::ai::ProviderKind;
use crate::models::{Artifact, Document, Verdict};

/// In-memory session state
#[derive(Debug)]
pub struct ExtractionSession {
    pub id: Uuid,
    pub origin_name: String,
    pub digest: String,
    pub byte_len: u64,
    pub stage: Stage,
    /// Progress within the current stage, 0-100
    pub percent: u8,
    pub note: Option<String>,
    /// Provider chosen at analyze time
    pub provider: Option<ProviderKind>,
    pub verdict: Option<Verdict>,
    pub artifact: Option<Artifact>,
    /// (code, message) on terminal failure
    pub error: Option<(String, String)>,
    /// Document bytes; owned by the session until a terminal state
    pub document: Option<Document>,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
}

impl ExtractionSession {
    pub fn new(document: Document) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            origin_name: document.origin_name.clone(),
            digest: document.digest.clone(),
            byte_len: document.len(),
            stage: Stage::Uploaded,
            percent: 0,
            note: None,
            provider: None,
            verdict: None,
            artifact: None,
            error: None,
            document: Some(document),
            created_at: now,
            last_touched_at: now,
        }
    }

    /// Transition to a new stage
    ///
    /// Terminal stages are absorbing and stage indices never decrease; a
    /// violating transition is ignored and logged rather than applied.
    /// Returns whether the transition took effect.
    pub fn transition_to(&mut self, next: Stage) -> bool {
        if self.stage.is_terminal() {
            tracing::warn!(
                session_id = %self.id,
                from = %self.stage,
                to = %next,
                "Ignoring transition out of a terminal stage"
            );
            return false;
        }
        if next.index() < self.stage.index() {
            tracing::warn!(
                session_id = %self.id,
                from = %self.stage,
                to = %next,
                "Ignoring regressing stage transition"
            );
            return false;
        }
        self.stage = next;
        self.percent = 0;
        self.last_touched_at = Utc::now();
        if next.is_terminal() {
            // The session gives up the document bytes at terminal state
            self.document = None;
        }
        true
    }

    /// Update progress within the current stage; monotone non-decreasing
    pub fn set_progress(&mut self, percent: u8, note: Option<String>) {
        self.percent = self.percent.max(percent.min(100));
        if note.is_some() {
            self.note = note;
        }
        self.last_touched_at = Utc::now();
    }

    /// Record a terminal failure
    pub fn fail(&mut self, stage: Stage, code: &str, message: String) {
        debug_assert!(stage.is_terminal());
        self.error = Some((code.to_string(), message));
        self.transition_to(stage);
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn touch(&mut self) {
        self.last_touched_at = Utc::now();
    }

    /// API-facing snapshot; never exposes the document bytes
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            origin_name: self.origin_name.clone(),
            digest: self.digest.clone(),
            byte_len: self.byte_len,
            stage: self.stage,
            percent: self.percent,
            note: self.note.clone(),
            provider: self.provider,
            verdict: self.verdict.clone(),
            error: self.error.as_ref().map(|(code, message)| SessionError {
                code: code.clone(),
                message: message.clone(),
            }),
            created_at: self.created_at,
            last_touched_at: self.last_touched_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionError {
    pub code: String,
    pub message: String,
}

/// Serializable session view returned by `status`
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub origin_name: String,
    pub digest: String,
    pub byte_len: u64,
    pub stage: Stage,
    pub percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ExtractionSession {
        ExtractionSession::new(Document::new("a.pdf", b"bytes".to_vec()))
    }

    #[test]
    fn stages_never_regress() {
        let mut s = session();
        assert!(s.transition_to(Stage::Identifying));
        assert!(s.transition_to(Stage::Extracting));
        assert!(!s.transition_to(Stage::Identifying));
        assert_eq!(s.stage, Stage::Extracting);
    }

    #[test]
    fn terminal_stages_absorb() {
        let mut s = session();
        s.transition_to(Stage::Identifying);
        s.fail(Stage::FailedIdentification, "ai_unreachable", "down".into());
        assert!(!s.transition_to(Stage::Extracting));
        assert!(!s.transition_to(Stage::Completed));
        assert_eq!(s.stage, Stage::FailedIdentification);
    }

    #[test]
    fn percent_is_monotone_within_a_stage() {
        let mut s = session();
        s.transition_to(Stage::Extracting);
        s.set_progress(40, None);
        s.set_progress(20, None);
        assert_eq!(s.percent, 40);
        s.set_progress(90, None);
        assert_eq!(s.percent, 90);
    }

    #[test]
    fn percent_resets_on_stage_change() {
        let mut s = session();
        s.transition_to(Stage::Extracting);
        s.set_progress(90, None);
        s.transition_to(Stage::Enhancing);
        assert_eq!(s.percent, 0);
    }

    #[test]
    fn document_bytes_are_released_at_terminal() {
        let mut s = session();
        assert!(s.document.is_some());
        s.transition_to(Stage::Identifying);
        s.fail(Stage::Cancelled, "cancelled", "cancelled".into());
        assert!(s.document.is_none());
    }
}

//! Extraction units and the final pipeline artifact

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Verdict;
use crate::confidence::ConfidenceReport;

/// Category sentinel for sections the categorizer could not place
pub const UNCATEGORIZED: &str = "Uncategorized";

/// A table extracted from one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Locator id, `page_{page}_table_{n}`
    pub id: String,
    pub page: u32,
    pub ordinal: u32,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Rectangular-shape heuristic used by the confidence scorer
    pub fn is_rectangular(&self) -> bool {
        !self.headers.is_empty()
            && !self.rows.is_empty()
            && self.rows.iter().all(|r| r.len() == self.headers.len())
    }
}

/// An extraction unit, uniquely identified by (page, ordinal) within a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Source page number, 1-based
    pub page: u32,
    /// Ordinal within the page, 0-based
    pub ordinal: u32,
    pub title: String,
    pub raw_text: String,
    pub enhanced_text: String,
    pub category: String,
    /// Category confidence in [0,1]
    pub category_confidence: f64,
    pub has_tables: bool,
    pub tables: Vec<Table>,
    pub word_count: usize,
    /// Whether OCR produced this page's text
    pub ocr_used: bool,
    /// Per-page OCR confidence in [0,1] when OCR was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f64>,
}

impl Section {
    /// Stable record id under a collection, `{collection}_page{page}_{ordinal}`
    pub fn record_id(&self, collection: &str) -> String {
        format!("{}_page{}_{}", collection, self.page, self.ordinal)
    }
}

/// Quality metrics emitted by the text enhancer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Quality score before enhancement, 0-100
    pub score_before: f64,
    /// Quality score after enhancement, 0-100
    pub score_after: f64,
    pub grade_before: char,
    pub grade_after: char,
    /// Correction counts by kind (run_on, missing_space, ocr_sub, spelling)
    pub corrections: BTreeMap<String, usize>,
    /// Pages whose enhancement raised an error and fell back to raw text
    pub pages_failed: usize,
    /// Pages skipped because OCR was needed but unavailable
    pub pages_ocr_unavailable: usize,
}

impl QualityMetrics {
    pub fn total_corrections(&self) -> usize {
        self.corrections.values().sum()
    }
}

/// A quote attributed to a character, verbatim with its page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterQuote {
    pub text: String,
    pub page: u32,
}

/// A character discovered by the novel pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    /// Canonical id, the sanitized canonical name
    pub id: String,
    pub name: String,
    /// Other surface forms seen in the text
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Distinct pages the character appears on
    pub pages: Vec<u32>,
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub behaviors: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<CharacterQuote>,
}

/// Aggregate counts over an artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactCounts {
    pub pages: usize,
    pub words: usize,
    pub sections: usize,
    pub tables: usize,
    /// Per-category section histogram
    pub categories: BTreeMap<String, usize>,
}

/// The complete result of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub verdict: Verdict,
    /// Sections sorted by (page, ordinal)
    pub sections: Vec<Section>,
    pub counts: ArtifactCounts,
    pub confidence: ConfidenceReport,
    pub quality: QualityMetrics,
    /// Characters from the novel pass; empty for source material.
    /// Relationships live in the adjacency map, not as back-references.
    #[serde(default)]
    pub characters: Vec<Character>,
    /// Character relationship adjacency, keyed by character id
    #[serde(default)]
    pub character_relationships: BTreeMap<String, Vec<String>>,
    pub ingested_at: DateTime<Utc>,
}

impl Artifact {
    /// Build aggregate counts from the section list
    pub fn tally(sections: &[Section]) -> ArtifactCounts {
        let mut counts = ArtifactCounts::default();
        let mut pages = std::collections::BTreeSet::new();
        for s in sections {
            pages.insert(s.page);
            counts.words += s.word_count;
            counts.tables += s.tables.len();
            *counts.categories.entry(s.category.clone()).or_default() += 1;
        }
        counts.pages = pages.len();
        counts.sections = sections.len();
        counts
    }
}

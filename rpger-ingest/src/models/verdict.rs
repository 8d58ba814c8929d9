//! Classification verdict produced once per document

use serde::{Deserialize, Serialize};

/// Document content class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    SourceMaterial,
    Novel,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::SourceMaterial => "source_material",
            ContentKind::Novel => "novel",
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source_material" | "source" => Ok(ContentKind::SourceMaterial),
            "novel" => Ok(ContentKind::Novel),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// How a classification verdict was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    ExplicitTitle,
    AiInference,
    ManualOverride,
    FallbackKeyword,
}

/// Classification verdict consumed by all downstream stages
///
/// The schema is closed for readers; providers may attach open metadata
/// only under `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: ContentKind,
    /// Game system identifier, e.g. `dnd`
    pub game: String,
    /// Edition identifier, e.g. `1st`
    pub edition: String,
    /// Book code, e.g. `phb`
    pub book: String,
    /// Display title, e.g. `Player's Handbook`
    pub book_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn_10: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn_13: Option<String>,
    /// Confidence in [0,1]
    pub confidence: f64,
    pub rationale: String,
    pub derivation: Derivation,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Verdict {
    /// Canonical ISBN to key the duplicate registry, if any was detected
    pub fn canonical_isbn(&self) -> Option<&str> {
        self.isbn_13.as_deref().or(self.isbn_10.as_deref())
    }

    /// Clamp confidence into [0,1]; providers are not trusted on range
    pub fn clamp_confidence(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_serde() {
        let json = serde_json::to_string(&ContentKind::SourceMaterial).unwrap();
        assert_eq!(json, "\"source_material\"");
        let back: ContentKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ContentKind::SourceMaterial);
    }

    #[test]
    fn confidence_is_clamped() {
        let v = Verdict {
            kind: ContentKind::Novel,
            game: "dnd".into(),
            edition: "1st".into(),
            book: "phb".into(),
            book_title: "Player's Handbook".into(),
            publisher: None,
            isbn_10: None,
            isbn_13: None,
            confidence: 1.7,
            rationale: String::new(),
            derivation: Derivation::AiInference,
            extra: Default::default(),
        }
        .clamp_confidence();
        assert_eq!(v.confidence, 1.0);
    }
}

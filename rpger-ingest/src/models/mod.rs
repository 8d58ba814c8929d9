//! Core data model for the extraction pipeline

mod artifact;
mod verdict;

pub use artifact::{
    Artifact, ArtifactCounts, Character, CharacterQuote, QualityMetrics, Section, Table,
    UNCATEGORIZED,
};
pub use verdict::{ContentKind, Derivation, Verdict};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// An uploaded document: bytes plus origin metadata
#[derive(Debug, Clone)]
pub struct Document {
    pub origin_name: String,
    pub bytes: Vec<u8>,
    pub digest: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn new(origin_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = format!("{:x}", Sha256::digest(&bytes));
        Self {
            origin_name: origin_name.into(),
            bytes,
            digest,
            uploaded_at: Utc::now(),
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_sha256_hex() {
        let doc = Document::new("a.pdf", b"test content".to_vec());
        assert_eq!(doc.digest.len(), 64);
        assert_eq!(
            doc.digest,
            format!("{:x}", Sha256::digest(b"test content"))
        );
    }
}

//! Collection addressing
//!
//! Derives the deterministic collection name (and folder path, in the
//! single-collection layout) from a classification verdict. Pure; safe
//! to call repeatedly — sanitization is idempotent.

use serde::{Deserialize, Serialize};

use crate::catalog::catalog;
use crate::models::Verdict;

/// Persisted-state layout choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Each book gets its own dotted collection name
    #[default]
    Separate,
    /// One `rpger` collection; the hierarchy lives in folder metadata
    SingleWithFolder,
}

impl std::str::FromStr for Layout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "separate" => Ok(Layout::Separate),
            "single" | "single_with_folder" => Ok(Layout::SingleWithFolder),
            other => Err(format!("unknown layout: {other}")),
        }
    }
}

/// Name of the shared collection in the single-with-folder layout
pub const SINGLE_COLLECTION: &str = "rpger";

/// Address of a verdict's persisted data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionAddress {
    /// Collection name in the target store
    pub collection: String,
    /// Folder path metadata; `None` in the separate layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    /// Leaf collection name, `<prefix>_<edition>_<book>`
    pub leaf: String,
}

/// Derive the address for a verdict under a layout
pub fn address(verdict: &Verdict, layout: Layout) -> CollectionAddress {
    let kind = sanitize(verdict.kind.as_str());
    let game = sanitize(&verdict.game);
    let edition = sanitize(&verdict.edition);
    let book = sanitize(&verdict.book);

    let prefix = catalog()
        .game(&verdict.game)
        .map(|g| g.prefix.to_string())
        .unwrap_or_else(|| game.clone());
    let leaf = format!("{}_{}_{}", sanitize(&prefix), edition, book);

    match layout {
        Layout::Separate => CollectionAddress {
            collection: format!("{kind}.{game}.{edition}.{book}.{leaf}"),
            folder_path: None,
            leaf,
        },
        Layout::SingleWithFolder => CollectionAddress {
            collection: SINGLE_COLLECTION.to_string(),
            folder_path: Some(format!("{kind}/{game}/{edition}/{book}/{leaf}")),
            leaf,
        },
    }
}

/// Segment sanitizer: lowercase, `&` to `and`, whitespace to `_`, strip
/// everything outside `[a-z0-9_]`
pub fn sanitize(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.to_lowercase().chars() {
        match c {
            '&' => out.push_str("and"),
            c if c.is_whitespace() => out.push('_'),
            c if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' => out.push(c),
            _ => {}
        }
    }
    out
}

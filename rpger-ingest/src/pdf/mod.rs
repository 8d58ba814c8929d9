//! PDF capability facade
//!
//! Byte-level parsing, OCR, and table detection are external primitives;
//! the pipeline only sees the [`PdfBackend`] trait. Two backends ship:
//! [`LopdfBackend`] for real documents (native text only) and
//! [`ScriptedBackend`] for deterministic in-memory documents used by the
//! test suite and mock runs.

mod lopdf_backend;
mod scripted;

pub use lopdf_backend::LopdfBackend;
pub use scripted::{ScriptedBackend, ScriptedPage};

use rpger_common::{Error, Result};

use crate::models::Table;

/// Document metadata; missing fields are empty strings, not errors
#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    pub page_count: u32,
}

/// One page's text with OCR provenance
#[derive(Debug, Clone)]
pub struct PageText {
    pub text: String,
    /// True when a rasterize+OCR fallback produced the text
    pub ocr_used: bool,
    /// Per-page OCR confidence in [0,1] when `ocr_used`
    pub ocr_confidence: Option<f64>,
}

/// First-n-pages sample, possibly truncated at the character ceiling
#[derive(Debug, Clone)]
pub struct TextSample {
    pub text: String,
    pub truncated: bool,
}

/// An opened document handle
pub trait PdfHandle: Send + Sync {
    fn metadata(&self) -> PdfMetadata;

    fn page_count(&self) -> u32;

    /// Text of page `i` (1-based); native text if present, else the OCR
    /// fallback. `ocr_unavailable` when OCR would be needed but no OCR
    /// primitive exists.
    fn page_text(&self, i: u32) -> Result<PageText>;

    /// Tables of page `i`; an empty list is not an error
    fn page_tables(&self, i: u32) -> Result<Vec<Table>>;
}

/// Opens documents
pub trait PdfBackend: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfHandle>>;
}

/// Concatenation of the first `n` page texts, bounded by `char_ceiling`
///
/// Pages that fail to extract contribute nothing; the sample is only an
/// identification input, not the extraction itself.
pub fn first_n_pages_text(handle: &dyn PdfHandle, n: u32, char_ceiling: usize) -> TextSample {
    let mut out = String::new();
    let mut truncated = false;
    let last = n.min(handle.page_count());
    for i in 1..=last {
        let Ok(page) = handle.page_text(i) else {
            continue;
        };
        if out.len() + page.text.len() > char_ceiling {
            let room = char_ceiling.saturating_sub(out.len());
            let mut cut = room;
            while cut > 0 && !page.text.is_char_boundary(cut) {
                cut -= 1;
            }
            out.push_str(&page.text[..cut]);
            truncated = true;
            break;
        }
        out.push_str(&page.text);
        out.push('\n');
    }
    TextSample { text: out, truncated }
}

/// Validate an opened handle against the empty-document rule
pub fn require_pages(handle: &dyn PdfHandle) -> Result<()> {
    if handle.page_count() == 0 {
        return Err(Error::PdfEmpty);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(pages: &[&str]) -> ScriptedBackend {
        ScriptedBackend::from_texts(pages)
    }

    #[test]
    fn sample_concatenates_first_pages() {
        let backend = scripted(&["one", "two", "three", "four"]);
        let handle = backend.open(b"ignored").unwrap();
        let sample = first_n_pages_text(handle.as_ref(), 2, 5_000);
        assert!(sample.text.contains("one"));
        assert!(sample.text.contains("two"));
        assert!(!sample.text.contains("three"));
        assert!(!sample.truncated);
    }

    #[test]
    fn sample_truncates_at_ceiling() {
        let long = "x".repeat(4_000);
        let backend = scripted(&[&long, &long]);
        let handle = backend.open(b"ignored").unwrap();
        let sample = first_n_pages_text(handle.as_ref(), 2, 5_000);
        assert_eq!(sample.text.len(), 5_000);
        assert!(sample.truncated);
    }

    #[test]
    fn zero_pages_is_pdf_empty() {
        let backend = ScriptedBackend::from_texts(&[]);
        let handle = backend.open(b"ignored").unwrap();
        let err = require_pages(handle.as_ref()).unwrap_err();
        assert_eq!(err.code(), "pdf_empty");
    }
}

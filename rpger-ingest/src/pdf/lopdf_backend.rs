//! Real PDF backend over `lopdf`
//!
//! Extracts native page text and the document information dictionary.
//! No OCR or table-detection primitive is wired in: a page with no
//! native text yields `ocr_unavailable`, which the orchestrator treats
//! as a non-fatal per-page skip, and `page_tables` is always empty.

use lopdf::Document as LopdfDocument;
use rpger_common::{Error, Result};

use super::{PageText, PdfBackend, PdfHandle, PdfMetadata};
use crate::models::Table;

pub struct LopdfBackend;

struct LopdfHandle {
    doc: LopdfDocument,
    page_numbers: Vec<u32>,
}

impl PdfBackend for LopdfBackend {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfHandle>> {
        let doc = LopdfDocument::load_mem(bytes)
            .map_err(|e| Error::PdfUnreadable(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(Error::PdfEncrypted);
        }
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(Error::PdfEmpty);
        }
        Ok(Box::new(LopdfHandle { doc, page_numbers }))
    }
}

impl PdfHandle for LopdfHandle {
    fn metadata(&self) -> PdfMetadata {
        let mut meta = PdfMetadata {
            page_count: self.page_numbers.len() as u32,
            ..Default::default()
        };
        if let Ok(info) = self
            .doc
            .trailer
            .get(b"Info")
            .and_then(|o| o.as_reference())
            .and_then(|id| self.doc.get_dictionary(id))
        {
            meta.title = info_string(info, b"Title");
            meta.author = info_string(info, b"Author");
            meta.subject = info_string(info, b"Subject");
            meta.keywords = info_string(info, b"Keywords");
        }
        meta
    }

    fn page_count(&self) -> u32 {
        self.page_numbers.len() as u32
    }

    fn page_text(&self, i: u32) -> Result<PageText> {
        if i == 0 || i > self.page_count() {
            return Err(Error::PageFailed {
                page: i,
                reason: "page out of range".into(),
            });
        }
        let text = self
            .doc
            .extract_text(&[i])
            .map_err(|e| Error::PageFailed {
                page: i,
                reason: e.to_string(),
            })?;
        if text.trim().is_empty() {
            // Scanned page with no text layer; an OCR primitive is not
            // wired into this backend.
            return Err(Error::OcrUnavailable(i));
        }
        Ok(PageText {
            text,
            ocr_used: false,
            ocr_confidence: None,
        })
    }

    fn page_tables(&self, _i: u32) -> Result<Vec<Table>> {
        Ok(Vec::new())
    }
}

fn info_string(dict: &lopdf::Dictionary, key: &[u8]) -> String {
    dict.get(key)
        .ok()
        .and_then(|o| o.as_str().ok())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_default()
}

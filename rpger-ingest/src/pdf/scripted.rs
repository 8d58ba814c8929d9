//! Deterministic in-memory PDF backend
//!
//! Tests and mock runs construct exact page contents: text, tables, OCR
//! provenance, and injected failures. The same bytes always open to the
//! same pages.

use rpger_common::{Error, Result};

use super::{PageText, PdfBackend, PdfHandle, PdfMetadata};
use crate::models::Table;

/// One scripted page
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub text: String,
    pub tables: Vec<Table>,
    pub ocr_used: bool,
    pub ocr_confidence: Option<f64>,
    /// Simulate a page whose text needs OCR that is unavailable
    pub ocr_unavailable: bool,
    /// Simulate a structural per-page failure
    pub fail: bool,
}

impl ScriptedPage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_table(mut self, headers: &[&str], rows: &[&[&str]]) -> Self {
        let page_hint = 0; // fixed up when the backend assigns page numbers
        self.tables.push(Table {
            id: format!("page_{page_hint}_table_{}", self.tables.len() + 1),
            page: page_hint,
            ordinal: self.tables.len() as u32,
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        });
        self
    }

    pub fn ocr(mut self, confidence: f64) -> Self {
        self.ocr_used = true;
        self.ocr_confidence = Some(confidence);
        self
    }
}

/// Backend yielding a fixed page list regardless of input bytes
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    pub metadata: PdfMetadata,
    pub pages: Vec<ScriptedPage>,
    /// Simulate a password-protected document
    pub encrypted: bool,
}

impl ScriptedBackend {
    pub fn new(pages: Vec<ScriptedPage>) -> Self {
        Self {
            metadata: PdfMetadata {
                page_count: pages.len() as u32,
                ..Default::default()
            },
            pages,
            encrypted: false,
        }
    }

    /// Convenience: plain-text pages
    pub fn from_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| ScriptedPage::text(*t)).collect())
    }

    pub fn with_metadata(mut self, metadata: PdfMetadata) -> Self {
        self.metadata = metadata;
        self.metadata.page_count = self.pages.len() as u32;
        self
    }
}

struct ScriptedHandle {
    metadata: PdfMetadata,
    pages: Vec<ScriptedPage>,
}

impl PdfBackend for ScriptedBackend {
    fn open(&self, _bytes: &[u8]) -> Result<Box<dyn PdfHandle>> {
        if self.encrypted {
            return Err(Error::PdfEncrypted);
        }
        // Assign real page numbers into table locators
        let mut pages = self.pages.clone();
        for (idx, page) in pages.iter_mut().enumerate() {
            let page_no = idx as u32 + 1;
            for (t_idx, table) in page.tables.iter_mut().enumerate() {
                table.page = page_no;
                table.ordinal = t_idx as u32;
                table.id = format!("page_{}_table_{}", page_no, t_idx + 1);
            }
        }
        Ok(Box::new(ScriptedHandle {
            metadata: self.metadata.clone(),
            pages,
        }))
    }
}

impl PdfHandle for ScriptedHandle {
    fn metadata(&self) -> PdfMetadata {
        self.metadata.clone()
    }

    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_text(&self, i: u32) -> Result<PageText> {
        let page = self
            .pages
            .get(i.saturating_sub(1) as usize)
            .ok_or(Error::PageFailed {
                page: i,
                reason: "page out of range".into(),
            })?;
        if page.fail {
            return Err(Error::PageFailed {
                page: i,
                reason: "scripted failure".into(),
            });
        }
        if page.ocr_unavailable {
            return Err(Error::OcrUnavailable(i));
        }
        Ok(PageText {
            text: page.text.clone(),
            ocr_used: page.ocr_used,
            ocr_confidence: page.ocr_confidence,
        })
    }

    fn page_tables(&self, i: u32) -> Result<Vec<Table>> {
        Ok(self
            .pages
            .get(i.saturating_sub(1) as usize)
            .map(|p| p.tables.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_locators_carry_page_numbers() {
        let backend = ScriptedBackend::new(vec![
            ScriptedPage::text("intro"),
            ScriptedPage::text("with table").with_table(&["Level", "XP"], &[&["1", "0"]]),
        ]);
        let handle = backend.open(b"").unwrap();
        let tables = handle.page_tables(2).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].page, 2);
        assert_eq!(tables[0].id, "page_2_table_1");
    }

    #[test]
    fn encrypted_backend_refuses_open() {
        let backend = ScriptedBackend {
            encrypted: true,
            ..ScriptedBackend::from_texts(&["x"])
        };
        assert_eq!(backend.open(b"").unwrap_err().code(), "pdf_encrypted");
    }

    #[test]
    fn ocr_pages_report_provenance() {
        let backend = ScriptedBackend::new(vec![ScriptedPage::text("scanned page").ocr(0.84)]);
        let handle = backend.open(b"").unwrap();
        let page = handle.page_text(1).unwrap();
        assert!(page.ocr_used);
        assert_eq!(page.ocr_confidence, Some(0.84));
    }
}

//! Two-pass document identification
//!
//! Explicit-title scan first, AI verdict second, keyword vote as the
//! degradation path, then ISBN attachment and manual overrides. The
//! output verdict feeds every downstream stage.

pub mod isbn;

use rpger_common::config::{Config, IDENTIFY_CHAR_CEILING};
use rpger_common::Result;

use crate::ai::{CallOptions, ProviderClient};
use crate::catalog::{catalog, normalize_title};
use crate::models::{ContentKind, Derivation, Verdict};
use crate::pdf::{first_n_pages_text, PdfHandle};

/// Pages sampled for identification
const IDENTIFY_PAGES: u32 = 15;
/// Pages scanned from each end of the document for ISBNs
const ISBN_EDGE_PAGES: u32 = 3;
/// Ceiling on keyword-fallback confidence
const FALLBACK_CONFIDENCE_CAP: f64 = 0.6;

/// Caller-supplied classification overrides
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub game: Option<String>,
    pub edition: Option<String>,
    pub book: Option<String>,
    pub kind: Option<ContentKind>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.game.is_none() && self.edition.is_none() && self.book.is_none() && self.kind.is_none()
    }
}

pub struct Identifier<'a> {
    client: &'a ProviderClient,
    config: &'a Config,
}

impl<'a> Identifier<'a> {
    pub fn new(client: &'a ProviderClient, config: &'a Config) -> Self {
        Self { client, config }
    }

    /// Produce the classification verdict for an opened document
    ///
    /// Never fails outright on provider trouble: the keyword fallback
    /// catches provider exhaustion, and only a document with no signal
    /// at all yields the zero-confidence `unknown` verdict the
    /// orchestrator maps to `failed_identification`.
    pub async fn identify(
        &self,
        handle: &dyn PdfHandle,
        kind_hint: ContentKind,
        overrides: &Overrides,
    ) -> Result<Verdict> {
        let sample = first_n_pages_text(handle, IDENTIFY_PAGES, IDENTIFY_CHAR_CEILING);
        if sample.truncated {
            tracing::debug!("Identification sample truncated at the character ceiling");
        }

        // The document information dictionary often carries the title
        // even when the cover page is an image; scan it alongside the
        // page sample.
        let metadata = handle.metadata();
        let title_source = format!("{}\n{}", metadata.title, sample.text);

        let mut verdict = match self.explicit_title(&title_source, kind_hint) {
            Some(v) => v,
            None => self.provider_or_fallback(&sample.text, kind_hint).await,
        };

        if let Some(found) = self.scan_isbn(handle) {
            verdict.isbn_10 = found.isbn_10;
            verdict.isbn_13 = Some(found.isbn_13);
        }

        if !overrides.is_empty() {
            apply_overrides(&mut verdict, overrides);
        }

        tracing::info!(
            game = %verdict.game,
            edition = %verdict.edition,
            book = %verdict.book,
            kind = verdict.kind.as_str(),
            derivation = ?verdict.derivation,
            confidence = verdict.confidence,
            "Document identified"
        );

        Ok(verdict.clamp_confidence())
    }

    /// Pass 1: normalized book-title synonym scan
    fn explicit_title(&self, sample: &str, kind_hint: ContentKind) -> Option<Verdict> {
        let normalized = normalize_title(sample);
        let syn = catalog().synonym(&normalized)?;
        let title = catalog()
            .book_title(syn.game, syn.edition, syn.book)
            .unwrap_or(syn.book);
        Some(Verdict {
            kind: kind_hint,
            game: syn.game.to_string(),
            edition: syn.edition.to_string(),
            book: syn.book.to_string(),
            book_title: title.to_string(),
            publisher: None,
            isbn_10: None,
            isbn_13: None,
            confidence: 0.95,
            rationale: format!("explicit title match: {}", syn.fragment),
            derivation: Derivation::ExplicitTitle,
            extra: Default::default(),
        })
    }

    /// Pass 2: provider verdict, degrading to the pure keyword vote
    async fn provider_or_fallback(&self, sample: &str, kind_hint: ContentKind) -> Verdict {
        let opts = CallOptions::identify_defaults(self.config);
        match self.client.identify(sample, kind_hint, &opts).await {
            Ok(draft) => Verdict {
                kind: draft.kind,
                game: draft.game,
                edition: draft.edition,
                book: draft.book,
                book_title: draft.book_title,
                publisher: draft.publisher,
                isbn_10: None,
                isbn_13: None,
                confidence: draft.confidence,
                rationale: draft.rationale,
                derivation: Derivation::AiInference,
                extra: Default::default(),
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    provider = %self.client.kind(),
                    "Provider exhausted; falling back to keyword vote"
                );
                keyword_fallback(sample, kind_hint)
            }
        }
    }

    /// Pass 3: ISBN scan over the first and last three pages
    fn scan_isbn(&self, handle: &dyn PdfHandle) -> Option<isbn::Isbn> {
        let count = handle.page_count();
        let mut pages: Vec<u32> = (1..=count.min(ISBN_EDGE_PAGES)).collect();
        let tail_start = count.saturating_sub(ISBN_EDGE_PAGES) + 1;
        for i in tail_start.max(1)..=count {
            if !pages.contains(&i) {
                pages.push(i);
            }
        }
        let mut text = String::new();
        for i in pages {
            if let Ok(page) = handle.page_text(i) {
                text.push_str(&page.text);
                text.push('\n');
            }
        }
        isbn::scan(&text)
    }
}

/// Pure keyword vote over the catalog, capped at 0.6 confidence
pub fn keyword_fallback(sample: &str, kind_hint: ContentKind) -> Verdict {
    let cat = catalog();
    match cat.keyword_vote(sample) {
        Some((game, density)) => {
            let system = cat.game(game).expect("vote winner exists");
            let edition = system.editions.first().map(|e| e.id).unwrap_or("1st");
            let (book, title) = system
                .editions
                .first()
                .and_then(|e| e.books.first())
                .map(|b| (b.code, b.title))
                .unwrap_or(("core", "Core Rules"));
            Verdict {
                kind: kind_hint,
                game: game.to_string(),
                edition: edition.to_string(),
                book: book.to_string(),
                book_title: title.to_string(),
                publisher: None,
                isbn_10: None,
                isbn_13: None,
                confidence: density.min(FALLBACK_CONFIDENCE_CAP),
                rationale: format!("keyword fallback, density {density:.2}"),
                derivation: Derivation::FallbackKeyword,
                extra: Default::default(),
            }
        }
        None => Verdict {
            kind: kind_hint,
            game: "unknown".to_string(),
            edition: "unknown".to_string(),
            book: "unknown".to_string(),
            book_title: "Unknown".to_string(),
            publisher: None,
            isbn_10: None,
            isbn_13: None,
            confidence: 0.0,
            rationale: "no keyword hits".to_string(),
            derivation: Derivation::FallbackKeyword,
            extra: Default::default(),
        },
    }
}

/// Manual overrides replace fields and force derivation + confidence 1.0
fn apply_overrides(verdict: &mut Verdict, overrides: &Overrides) {
    if let Some(game) = &overrides.game {
        verdict.game = game.clone();
    }
    if let Some(edition) = &overrides.edition {
        verdict.edition = edition.clone();
    }
    if let Some(book) = &overrides.book {
        verdict.book = book.clone();
        verdict.book_title = catalog()
            .book_title(&verdict.game, &verdict.edition, book)
            .map(str::to_string)
            .unwrap_or_else(|| book.clone());
    }
    if let Some(kind) = overrides.kind {
        verdict.kind = kind;
    }
    verdict.derivation = Derivation::ManualOverride;
    verdict.confidence = 1.0;
    verdict.rationale = "manual override".to_string();
}

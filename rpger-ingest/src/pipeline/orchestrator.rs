//! Pipeline orchestration
//!
//! Drives a session through upload, identification, dedup check,
//! per-page extraction/enhancement/categorization, scoring, the novel
//! character pass, and dual-store persistence. Single-writer per
//! session; per-page work runs on a bounded worker pool and a reorder
//! buffer restores (page, ordinal) order before anything persists.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::future::FutureExt;
use rpger_common::config::Config;
use rpger_common::events::{EventBus, SessionEvent, Stage};
use rpger_common::{Error, Result};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::registry::SessionRegistry;
use crate::addresser::{address, CollectionAddress, Layout};
use crate::ai::{build_provider, CallOptions, ProviderClient, ProviderKind};
use crate::confidence;
use crate::dedup::{DedupOutcome, DuplicateRegistry};
use crate::enhance::{quality_score, grade, EnhanceMode, TextEnhancer};
use crate::identify::{Identifier, Overrides};
use crate::models::{
    Artifact, ContentKind, Document, QualityMetrics, Section, Table, Verdict, UNCATEGORIZED,
};
use crate::novel::{self, DEFAULT_MIN_PAGES};
use crate::pdf::{require_pages, PdfBackend, PdfHandle};
use crate::store::{DocumentStore, StoreHealth, VectorRecord, VectorStore};

/// Inputs to an `extract` run
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub enhance: EnhanceMode,
    pub layout: Layout,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            enhance: EnhanceMode::Normal,
            layout: Layout::Separate,
        }
    }
}

/// `health()` response body
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub vector_store: StoreHealth,
    pub document_store: StoreHealth,
    pub providers: std::collections::BTreeMap<String, String>,
}

pub struct Orchestrator {
    config: Config,
    registry: Arc<SessionRegistry>,
    bus: EventBus,
    pdf_backend: Arc<dyn PdfBackend>,
    vector_store: Arc<dyn VectorStore>,
    document_store: Arc<dyn DocumentStore>,
    dedup: DuplicateRegistry,
    providers: Mutex<HashMap<ProviderKind, Arc<ProviderClient>>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        pdf_backend: Arc<dyn PdfBackend>,
        vector_store: Arc<dyn VectorStore>,
        document_store: Arc<dyn DocumentStore>,
    ) -> Self {
        let dedup = DuplicateRegistry::new(document_store.clone());
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            bus: EventBus::new(256),
            pdf_backend,
            vector_store,
            document_store,
            dedup,
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vector_store(&self) -> Arc<dyn VectorStore> {
        self.vector_store.clone()
    }

    pub fn document_store(&self) -> Arc<dyn DocumentStore> {
        self.document_store.clone()
    }

    /// Accept an upload; creates an `uploaded` session owning the bytes
    pub async fn upload(&self, bytes: Vec<u8>, origin_name: &str) -> Result<Uuid> {
        if bytes.len() as u64 > self.config.upload_max_bytes {
            return Err(Error::UploadTooLarge {
                size: bytes.len() as u64,
                limit: self.config.upload_max_bytes,
            });
        }
        let document = Document::new(origin_name, bytes);
        tracing::info!(
            origin = origin_name,
            bytes = document.len(),
            digest = %document.digest,
            "Document uploaded"
        );
        Ok(self.registry.create(document).await)
    }

    /// Drive a session to `identified`; returns the verdict
    ///
    /// Calling analyze again on an identified session returns the
    /// existing verdict unchanged.
    pub async fn analyze(
        &self,
        id: Uuid,
        provider: ProviderKind,
        kind: ContentKind,
        overrides: &Overrides,
    ) -> Result<Verdict> {
        let existing = self
            .registry
            .with_session(id, |s| {
                if let Some(v) = &s.verdict {
                    return Some(v.clone());
                }
                s.provider = Some(provider);
                None
            })
            .await?;
        if let Some(verdict) = existing {
            return Ok(verdict);
        }

        self.enter_stage(id, Stage::Identifying).await?;

        let bytes = self
            .registry
            .with_session(id, |s| s.document.as_ref().map(|d| d.bytes.clone()))
            .await?
            .ok_or_else(|| Error::BadSession(format!("{id}: document released")))?;

        let verdict = match self.identify_document(&bytes, provider, kind, overrides).await {
            Ok(v) => v,
            Err(e) => {
                self.fail_session(id, Stage::FailedIdentification, &e).await;
                return Err(e);
            }
        };

        if verdict.confidence == 0.0 && verdict.game == "unknown" {
            let e = Error::CatalogMissing("no game system detected in sample".into());
            self.fail_session(id, Stage::FailedIdentification, &e).await;
            return Err(e);
        }

        self.registry
            .with_session(id, |s| s.verdict = Some(verdict.clone()))
            .await?;
        self.enter_stage(id, Stage::Identified).await?;
        Ok(verdict)
    }

    async fn identify_document(
        &self,
        bytes: &[u8],
        provider: ProviderKind,
        kind: ContentKind,
        overrides: &Overrides,
    ) -> Result<Verdict> {
        let handle = self.open_document(bytes)?;
        let client = self.provider_client(provider).await?;
        let identifier = Identifier::new(&client, &self.config);
        identifier.identify(handle.as_ref(), kind, overrides).await
    }

    /// Drive an identified session to its terminal state
    ///
    /// Returns `Ok(())` for `completed` and `Err` carrying the terminal
    /// error otherwise (`rejected_duplicate` included, so CLI exit codes
    /// fall out of the error taxonomy).
    pub async fn extract(&self, id: Uuid, opts: ExtractOptions) -> Result<()> {
        let cancel = self.registry.cancel_token(id).await?;

        let (verdict, bytes, digest, provider) = self
            .registry
            .with_session(id, |s| {
                let verdict = s.verdict.clone();
                let bytes = s.document.as_ref().map(|d| d.bytes.clone());
                (verdict, bytes, s.digest.clone(), s.provider)
            })
            .await?;
        let verdict = verdict.ok_or_else(|| Error::BadSession(format!("{id}: not analyzed")))?;
        let bytes = bytes.ok_or_else(|| Error::BadSession(format!("{id}: document released")))?;
        let provider = provider.unwrap_or(ProviderKind::Mock);

        // Atomically claim the session for this run: a second concurrent
        // extract must not re-enter a pipeline already in flight.
        let claimed = self
            .registry
            .with_session(id, |s| {
                s.stage == Stage::Identified && s.transition_to(Stage::DedupCheck)
            })
            .await?;
        if !claimed {
            return Err(Error::BadSession(format!("{id}: not ready for extraction")));
        }
        let event = SessionEvent::StageChanged {
            session_id: id,
            stage: Stage::DedupCheck,
            timestamp: Utc::now(),
        };
        self.registry.record_event(&event).await;
        self.bus.send(event);

        match self
            .run_pipeline(id, &verdict, &bytes, &digest, provider, opts, &cancel)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                // Roll back any tentative registry claim before surfacing
                if let Some(isbn) = verdict.canonical_isbn() {
                    if let Err(rollback) = self.dedup.drop_tentative(isbn, id).await {
                        tracing::warn!(error = %rollback, isbn, "Tentative rollback failed");
                    }
                }
                match &e {
                    Error::Cancelled => {
                        self.registry
                            .with_session(id, |s| s.transition_to(Stage::Cancelled))
                            .await
                            .ok();
                        let event = SessionEvent::SessionCancelled {
                            session_id: id,
                            timestamp: Utc::now(),
                        };
                        self.registry.record_event(&event).await;
                        self.bus.send(event);
                    }
                    Error::RejectedDuplicate { isbn, first_ingested } => {
                        self.registry
                            .with_session(id, |s| {
                                s.error = Some((e.code().to_string(), e.to_string()));
                                s.transition_to(Stage::RejectedDuplicate)
                            })
                            .await
                            .ok();
                        let event = SessionEvent::DuplicateRejected {
                            session_id: id,
                            isbn: isbn.clone(),
                            first_ingested: first_ingested.clone(),
                            timestamp: Utc::now(),
                        };
                        self.registry.record_event(&event).await;
                        self.bus.send(event);
                    }
                    _ => {
                        let stage = terminal_stage_for(&e);
                        self.fail_session(id, stage, &e).await;
                    }
                }
                Err(e)
            }
        }
    }

    /// The happy-path pipeline; any `Err` is mapped to a terminal stage
    /// by `extract`
    #[allow(clippy::too_many_arguments)]
    fn run_pipeline<'a>(
        &'a self,
        id: Uuid,
        verdict: &'a Verdict,
        bytes: &'a [u8],
        digest: &'a str,
        provider: ProviderKind,
        opts: ExtractOptions,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
        // -- dedup_check --------------------------------------------------
        // The caller already claimed the DedupCheck stage atomically.
        check_cancel(cancel)?;
        if let Some(isbn) = verdict.canonical_isbn() {
            match self
                .dedup
                .check_and_claim(isbn, &verdict.book_title, id)
                .await?
            {
                DedupOutcome::Fresh | DedupOutcome::NoIsbn => {}
                DedupOutcome::Duplicate(entry) => {
                    return Err(Error::RejectedDuplicate {
                        isbn: entry.isbn,
                        first_ingested: entry.first_ingested_at.format("%Y-%m-%d").to_string(),
                    });
                }
            }
        }

        let handle = self.open_document(bytes)?;
        let page_count = handle.page_count() as usize;
        let workers = self.config.page_workers_for(page_count);
        let mut quality = QualityMetrics::default();

        // -- extracting / enhancing / categorizing ------------------------
        // Pages stream through the enhancer and categorizer one bounded
        // batch at a time; only the reorder buffer accumulates
        // full-document state. The session advances Extracting ->
        // Enhancing -> Categorizing as each phase drains.
        self.enter_stage(id, Stage::Extracting).await?;
        let client = self.provider_client(provider).await?;
        let sections = self
            .stream_sections(id, handle.clone(), verdict, &client, opts.enhance, workers, cancel, &mut quality)
            .await?;
        if sections.is_empty() {
            return Err(Error::PageFailed {
                page: 0,
                reason: "no page yielded any text".into(),
            });
        }

        // -- scoring ------------------------------------------------------
        self.enter_stage(id, Stage::Scoring).await?;
        check_cancel(cancel)?;
        let report = confidence::assess(&sections, &quality, page_count);
        self.emit_progress(id, Stage::Scoring, 100, None).await;

        // -- novel_characters ---------------------------------------------
        let (characters, relationships) = if verdict.kind == ContentKind::Novel {
            self.enter_stage(id, Stage::NovelCharacters).await?;
            check_cancel(cancel)?;
            match novel::run(&client, &sections, &self.config, DEFAULT_MIN_PAGES).await {
                Ok(out) => (out.characters, out.relationships),
                Err(e) => {
                    // Recorded, never fatal
                    tracing::warn!(session_id = %id, error = %e, "Character pass failed");
                    quality
                        .corrections
                        .insert("character_pass_failed".into(), 1);
                    (Vec::new(), Default::default())
                }
            }
        } else {
            (Vec::new(), Default::default())
        };

        let counts = Artifact::tally(&sections);
        let artifact = Artifact {
            verdict: verdict.clone(),
            sections,
            counts: counts.clone(),
            confidence: report,
            quality,
            characters,
            character_relationships: relationships,
            ingested_at: Utc::now(),
        };

        // -- persisting ---------------------------------------------------
        self.enter_stage(id, Stage::Persisting).await?;
        check_cancel(cancel)?;
        let note = self.persist(id, &artifact, digest, opts.layout).await?;

        if let Some(isbn) = artifact.verdict.canonical_isbn() {
            self.dedup
                .finalize(isbn, counts.sections, counts.words)
                .await?;
        }

        self.registry
            .with_session(id, |s| {
                s.artifact = Some(artifact.clone());
                s.note = note.clone();
                s.transition_to(Stage::Completed)
            })
            .await?;
        let event = SessionEvent::Completed {
            session_id: id,
            sections: counts.sections,
            words: counts.words,
            note,
            timestamp: Utc::now(),
        };
        self.registry.record_event(&event).await;
        self.bus.send(event);

        tracing::info!(
            session_id = %id,
            sections = counts.sections,
            words = counts.words,
            grade = %artifact.confidence.grade,
            "Extraction completed"
        );
        Ok(())
        })
    }

    /// Stream pages through extraction, enhancement, and categorization
    ///
    /// A producer task pulls page text and tables with `workers` fetches
    /// in flight and feeds a bounded channel of `2 x workers` entries —
    /// the queue between the PDF facade and the enhancer/categorizer.
    /// The consumer enhances and categorizes with `workers` futures in
    /// flight per phase, so in-flight state stays bounded regardless of
    /// document size. Only the reorder buffer accumulates the full
    /// document; it restores (page, ordinal) order at the end because
    /// categorization completes out of order.
    ///
    /// The session advances Extracting -> Enhancing -> Categorizing as
    /// each phase drains its last page.
    #[allow(clippy::too_many_arguments)]
    fn stream_sections<'a>(
        &'a self,
        id: Uuid,
        handle: Arc<dyn PdfHandle>,
        verdict: &'a Verdict,
        client: &'a Arc<ProviderClient>,
        mode: EnhanceMode,
        workers: usize,
        cancel: &'a CancellationToken,
        quality: &'a mut QualityMetrics,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Section>>> + Send + 'a>> {
        Box::pin(async move {
        let page_count = handle.page_count();
        let total = page_count as usize;
        let queue_depth = 2 * workers;

        let (tx, rx) = mpsc::channel::<PageOutcome>(queue_depth);
        let producer = tokio::spawn(extract_producer(
            handle.clone(),
            page_count,
            workers,
            cancel.clone(),
            tx,
        ));

        let enhancer = Arc::new(TextEnhancer::new(mode));
        let allowed = crate::catalog::catalog().categories(&verdict.game, verdict.kind);
        let opts = CallOptions::categorize_defaults(&self.config);

        // Phase counters; a skipped page advances every later phase too
        let processed = AtomicUsize::new(0);
        let skipped = AtomicUsize::new(0);
        let enhanced_count = AtomicUsize::new(0);
        let categorized_count = AtomicUsize::new(0);
        let metrics = Mutex::new(QualityMetrics::default());
        let score_sums = Mutex::new((0.0f64, 0.0f64));

        // The reorder buffer is the only full-document accumulation
        let mut reorder: Vec<Section> = Vec::new();
        let mut pipeline_error: Option<Error> = None;

        {
            let dequeued = stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|outcome| (outcome, rx))
            });

            // Phase 1: dequeue accounting; skips never flow downstream
            let pages = dequeued.filter_map(|outcome| {
                let metrics = &metrics;
                let processed = &processed;
                let skipped = &skipped;
                async move {
                    let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    let item = match outcome {
                        PageOutcome::Page(page) => Some(Ok(page)),
                        PageOutcome::Cancelled => Some(Err(Error::Cancelled)),
                        PageOutcome::OcrUnavailable(page) => {
                            // Skip the page's text contribution; not fatal
                            tracing::debug!(session_id = %id, page, "OCR unavailable; page skipped");
                            metrics.lock().await.pages_ocr_unavailable += 1;
                            skipped.fetch_add(1, Ordering::SeqCst);
                            None
                        }
                        PageOutcome::Failed { page, reason } => {
                            tracing::warn!(session_id = %id, page, reason, "Page failed; continuing");
                            metrics.lock().await.pages_failed += 1;
                            skipped.fetch_add(1, Ordering::SeqCst);
                            None
                        }
                    };
                    self.emit_progress(id, Stage::Extracting, percent(done, total), None)
                        .await;
                    if done == total {
                        self.advance_stage(id, Stage::Enhancing).await;
                    }
                    item
                }
                .boxed()
            });

            // Phase 2: enhancement; an enhancer exception on a page emits
            // the raw text unchanged and records the failure
            let enhanced_stream = pages
                .map(|item| {
                    let enhancer = enhancer.clone();
                    let metrics = &metrics;
                    let score_sums = &score_sums;
                    let enhanced_count = &enhanced_count;
                    let skipped = &skipped;
                    async move {
                        let page = item?;
                        check_cancel(cancel)?;
                        let raw = page.text.clone();
                        let join = tokio::task::spawn_blocking(move || {
                            let before = quality_score(&raw);
                            let out = enhancer.enhance(&raw);
                            let after = quality_score(&out.text);
                            (out, before, after)
                        })
                        .await;

                        let section = match join {
                            Ok((out, before, after)) => {
                                {
                                    let mut sums = score_sums.lock().await;
                                    sums.0 += before;
                                    sums.1 += after;
                                }
                                let mut collected = metrics.lock().await;
                                for (kind, count) in out.corrections {
                                    *collected.corrections.entry(kind).or_default() += count;
                                }
                                drop(collected);
                                section_from_page(page, out.text)
                            }
                            Err(join_err) => {
                                tracing::warn!(session_id = %id, error = %join_err, "Enhancer task failed");
                                metrics.lock().await.pages_failed += 1;
                                let raw = page.text.clone();
                                section_from_page(page, raw)
                            }
                        };

                        let done = enhanced_count.fetch_add(1, Ordering::SeqCst) + 1;
                        let advanced = done + skipped.load(Ordering::SeqCst);
                        self.emit_progress(id, Stage::Enhancing, percent(advanced, total), None)
                            .await;
                        if advanced == total {
                            self.advance_stage(id, Stage::Categorizing).await;
                        }
                        Ok(section)
                    }
                    .boxed()
                })
                .buffered(workers);

            // Phase 3: categorization; completes out of order, restored
            // by the reorder buffer below
            let categorized_stream = enhanced_stream
                .map(|item: Result<Section>| {
                    let client = client.clone();
                    let allowed = allowed.clone();
                    let opts = opts.clone();
                    let categorized_count = &categorized_count;
                    let skipped = &skipped;
                    async move {
                        let mut section = item?;
                        check_cancel(cancel)?;
                        match client
                            .categorize(&section.enhanced_text, &allowed, &opts)
                            .await
                        {
                            Ok(cat) => {
                                section.category = cat.category;
                                section.category_confidence = cat.confidence.clamp(0.0, 1.0);
                            }
                            Err(e) => {
                                // Provider exhausted for this section:
                                // degrade, never fail
                                tracing::debug!(session_id = %id, error = %e, "Categorization degraded");
                                section.category = UNCATEGORIZED.to_string();
                                section.category_confidence = 0.0;
                            }
                        }
                        let done = categorized_count.fetch_add(1, Ordering::SeqCst) + 1;
                        let advanced = done + skipped.load(Ordering::SeqCst);
                        self.emit_progress(id, Stage::Categorizing, percent(advanced, total), None)
                            .await;
                        Ok(section)
                    }
                    .boxed()
                })
                .buffer_unordered(workers);

            futures::pin_mut!(categorized_stream);
            while let Some(item) = categorized_stream.next().await {
                match item {
                    Ok(section) => reorder.push(section),
                    Err(e) => {
                        pipeline_error = Some(e);
                        break;
                    }
                }
            }
        }

        // The producer ends once the channel drains or its receiver drops
        let _ = producer.await;
        if let Some(e) = pipeline_error {
            return Err(e);
        }

        let collected = metrics.into_inner();
        quality.pages_failed += collected.pages_failed;
        quality.pages_ocr_unavailable += collected.pages_ocr_unavailable;
        for (kind, count) in collected.corrections {
            *quality.corrections.entry(kind).or_default() += count;
        }
        let (before_sum, after_sum) = score_sums.into_inner();
        if !reorder.is_empty() {
            quality.score_before = before_sum / reorder.len() as f64;
            quality.score_after = after_sum / reorder.len() as f64;
            quality.grade_before = grade(quality.score_before);
            quality.grade_after = grade(quality.score_after);
        }

        // Reorder buffer: parallel categorization must not reorder the
        // persisted sequence.
        reorder.sort_by_key(|s| (s.page, s.ordinal));
        Ok(reorder)
        })
    }

    /// Advance to a later pipeline stage exactly once
    ///
    /// Streaming phases overlap, so completion callbacks can race; the
    /// transition applies only when it moves the session forward.
    async fn advance_stage(&self, id: Uuid, stage: Stage) {
        let applied = self
            .registry
            .with_session(id, |s| {
                !s.stage.is_terminal() && s.stage.index() < stage.index() && s.transition_to(stage)
            })
            .await
            .unwrap_or(false);
        if applied {
            let event = SessionEvent::StageChanged {
                session_id: id,
                stage,
                timestamp: Utc::now(),
            };
            self.registry.record_event(&event).await;
            self.bus.send(event);
        }
    }

    /// Fan out to both stores under `all_must_succeed=false`
    ///
    /// One store failing leaves a `partial_persistence` note; both
    /// failing is `failed_persistence`.
    async fn persist(
        &self,
        id: Uuid,
        artifact: &Artifact,
        digest: &str,
        layout: Layout,
    ) -> Result<Option<String>> {
        let addr = address(&artifact.verdict, layout);

        let vector = self.persist_vector(artifact, digest, &addr);
        let document = self.persist_document(artifact, digest, &addr, layout);
        let (vector_result, document_result) = tokio::join!(vector, document);

        self.emit_progress(id, Stage::Persisting, 100, None).await;

        match (vector_result, document_result) {
            (Ok(()), Ok(())) => Ok(None),
            (Err(e), Ok(())) => {
                tracing::warn!(session_id = %id, error = %e, "Vector store failed; document store committed");
                Ok(Some(format!("partial_persistence: vector store failed ({})", e.code())))
            }
            (Ok(()), Err(e)) => {
                tracing::warn!(session_id = %id, error = %e, "Document store failed; vector store committed");
                Ok(Some(format!("partial_persistence: document store failed ({})", e.code())))
            }
            (Err(v), Err(d)) => {
                tracing::error!(session_id = %id, vector = %v, document = %d, "Both stores failed");
                Err(Error::StoreUnreachable(format!(
                    "vector: {v}; document: {d}"
                )))
            }
        }
    }

    async fn persist_vector(
        &self,
        artifact: &Artifact,
        digest: &str,
        addr: &CollectionAddress,
    ) -> Result<()> {
        // Vector collections are keyed by the leaf name; the hierarchy
        // rides in each record's metadata.
        let collection = &addr.leaf;
        self.vector_store.ensure_collection(collection).await?;

        let records: Vec<VectorRecord> = artifact
            .sections
            .iter()
            .map(|s| VectorRecord {
                id: s.record_id(collection),
                text: s.enhanced_text.clone(),
                metadata: json!({
                    "game": artifact.verdict.game,
                    "edition": artifact.verdict.edition,
                    "book": artifact.verdict.book,
                    "kind": artifact.verdict.kind.as_str(),
                    "page": s.page,
                    "ordinal": s.ordinal,
                    "category": s.category,
                    "source_digest": digest,
                    "folder_path": addr.folder_path,
                }),
            })
            .collect();

        match self.vector_store.upsert_sections(collection, &records).await {
            Err(Error::StoreOversize(reason)) => {
                // One retry with text truncated to 95% before surfacing
                tracing::warn!(reason, "Oversize value; retrying at 95% length");
                let truncated: Vec<VectorRecord> = records
                    .into_iter()
                    .map(|mut r| {
                        let target = r.text.len() * 95 / 100;
                        let mut end = target;
                        while end > 0 && !r.text.is_char_boundary(end) {
                            end -= 1;
                        }
                        r.text.truncate(end);
                        r
                    })
                    .collect();
                self.vector_store
                    .upsert_sections(collection, &truncated)
                    .await
            }
            other => other,
        }
    }

    async fn persist_document(
        &self,
        artifact: &Artifact,
        digest: &str,
        addr: &CollectionAddress,
        layout: Layout,
    ) -> Result<()> {
        let collection = &addr.collection;
        self.document_store.ensure_collection(collection).await?;

        let game_metadata = json!({
            "game": artifact.verdict.game,
            "edition": artifact.verdict.edition,
            "book": artifact.verdict.book,
            "book_title": artifact.verdict.book_title,
            "kind": artifact.verdict.kind.as_str(),
            "publisher": artifact.verdict.publisher,
            "detection_confidence": artifact.verdict.confidence,
            "derivation": artifact.verdict.derivation,
        });
        let import_date = artifact.ingested_at.to_rfc3339();

        match layout {
            Layout::SingleWithFolder => {
                // One document with the sections array; the hierarchy is
                // the folder path metadata.
                let doc = json!({
                    "_id": format!("{}_{}", addr.leaf, digest),
                    "folder_path": addr.folder_path,
                    "game_metadata": game_metadata,
                    "isbn": artifact.verdict.canonical_isbn(),
                    "import_date": import_date,
                    "counts": artifact.counts,
                    "confidence": artifact.confidence,
                    "sections": artifact.sections,
                    "characters": artifact.characters,
                    "character_relationships": artifact.character_relationships,
                });
                self.document_store.insert_whole(collection, doc).await?;
            }
            Layout::Separate => {
                let total = artifact.sections.len();
                let docs: Vec<serde_json::Value> = artifact
                    .sections
                    .iter()
                    .enumerate()
                    .map(|(index, s)| {
                        json!({
                            "_id": s.record_id(&addr.leaf),
                            "title": s.title,
                            "content": s.enhanced_text,
                            "page": s.page,
                            "ordinal": s.ordinal,
                            "category": s.category,
                            "tags": content_tags(&s.enhanced_text),
                            "word_count": s.word_count,
                            "has_tables": s.has_tables,
                            "tables": s.tables,
                            "game_metadata": game_metadata,
                            "isbn": artifact.verdict.canonical_isbn(),
                            "import_date": import_date,
                            "section_index": index,
                            "total_sections": total,
                        })
                    })
                    .collect();
                self.document_store.insert_split(collection, docs).await?;
            }
        }
        Ok(())
    }

    /// Cancel a session; idempotent and safe at any time
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        self.registry.cancel(id).await?;
        // A session cancelled before any pipeline work observes the token
        // must still reach the terminal state.
        let was_idle = self
            .registry
            .with_session(id, |s| {
                if !s.is_terminal() && matches!(s.stage, Stage::Uploaded | Stage::Identified) {
                    s.transition_to(Stage::Cancelled);
                    true
                } else {
                    false
                }
            })
            .await?;
        if was_idle {
            let event = SessionEvent::SessionCancelled {
                session_id: id,
                timestamp: Utc::now(),
            };
            self.registry.record_event(&event).await;
            self.bus.send(event);
        }
        Ok(())
    }

    /// Store and provider health
    pub async fn health(&self) -> HealthReport {
        let (vector_store, document_store, local_reachable) = tokio::join!(
            self.vector_store.ping(),
            self.document_store.ping(),
            probe_local_provider(&self.config.local_provider_url),
        );

        let mut providers = std::collections::BTreeMap::new();
        providers.insert("mock".to_string(), "ok".to_string());
        providers.insert(
            "cloud-a".to_string(),
            if self.config.provider_a_key.is_some() { "ok" } else { "down" }.to_string(),
        );
        providers.insert(
            "cloud-b".to_string(),
            if self.config.provider_b_key.is_some() { "ok" } else { "down" }.to_string(),
        );
        providers.insert(
            "local".to_string(),
            if local_reachable { "ok" } else { "down" }.to_string(),
        );

        HealthReport {
            vector_store,
            document_store,
            providers,
        }
    }

    /// Lazily build and cache a provider client
    ///
    /// The mock is always registered as the last resort: a provider that
    /// cannot even be constructed (missing key) degrades to it rather
    /// than failing the session outright.
    async fn provider_client(&self, kind: ProviderKind) -> Result<Arc<ProviderClient>> {
        let mut providers = self.providers.lock().await;
        if let Some(client) = providers.get(&kind) {
            return Ok(client.clone());
        }
        let client = match build_provider(kind, &self.config) {
            Ok(provider) => Arc::new(ProviderClient::new(provider)),
            Err(e) => {
                tracing::warn!(provider = %kind, error = %e, "Provider unavailable; using mock");
                Arc::new(ProviderClient::new(build_provider(
                    ProviderKind::Mock,
                    &self.config,
                )?))
            }
        };
        providers.insert(kind, client.clone());
        Ok(client)
    }

    fn open_document(&self, bytes: &[u8]) -> Result<Arc<dyn PdfHandle>> {
        let handle: Arc<dyn PdfHandle> = Arc::from(self.pdf_backend.open(bytes)?);
        require_pages(handle.as_ref())?;
        Ok(handle)
    }

    async fn enter_stage(&self, id: Uuid, stage: Stage) -> Result<()> {
        let applied = self
            .registry
            .with_session(id, |s| s.transition_to(stage))
            .await?;
        if !applied {
            return Err(Error::BadSession(format!("{id}: invalid transition to {stage}")));
        }
        let event = SessionEvent::StageChanged {
            session_id: id,
            stage,
            timestamp: Utc::now(),
        };
        self.registry.record_event(&event).await;
        self.bus.send(event);
        Ok(())
    }

    /// Record and broadcast progress for a stage
    ///
    /// Streaming phases run ahead of the session's coarse stage marker;
    /// progress for a stage the session is not currently in is counted
    /// by the caller but not emitted, so subscribers always observe
    /// events in stage order with non-decreasing percent per stage.
    async fn emit_progress(&self, id: Uuid, stage: Stage, percent: u8, note: Option<String>) {
        let clamped = self
            .registry
            .with_session(id, |s| {
                if s.stage != stage {
                    return None;
                }
                s.set_progress(percent, note.clone());
                Some(s.percent)
            })
            .await
            .ok()
            .flatten();
        let Some(clamped) = clamped else {
            return;
        };
        let event = SessionEvent::Progress {
            session_id: id,
            stage,
            percent: clamped,
            note,
            timestamp: Utc::now(),
        };
        self.registry.record_event(&event).await;
        self.bus.send(event);
    }

    async fn fail_session(&self, id: Uuid, stage: Stage, error: &Error) {
        let code = error.code().to_string();
        let message = error.to_string();
        self.registry
            .with_session(id, |s| s.fail(stage, &code, message.clone()))
            .await
            .ok();
        let event = SessionEvent::Failed {
            session_id: id,
            stage,
            code,
            message,
            timestamp: Utc::now(),
        };
        self.registry.record_event(&event).await;
        self.bus.send(event);
    }
}

struct PageExtract {
    page: u32,
    text: String,
    ocr_used: bool,
    ocr_confidence: Option<f64>,
    tables: Vec<Table>,
}

/// One page's journey out of the PDF facade
enum PageOutcome {
    Page(PageExtract),
    OcrUnavailable(u32),
    Failed { page: u32, reason: String },
    Cancelled,
}

/// Producer side of the bounded page channel
///
/// Keeps `workers` page fetches in flight and blocks on `send` when the
/// consumer falls behind, so at most the channel depth plus the fetch
/// window of pages exist outside the reorder buffer at any moment.
async fn extract_producer(
    handle: Arc<dyn PdfHandle>,
    page_count: u32,
    workers: usize,
    cancel: CancellationToken,
    tx: mpsc::Sender<PageOutcome>,
) {
    let fetches = stream::iter(1..=page_count)
        .map(|page| {
            let handle = handle.clone();
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return PageOutcome::Cancelled;
                }
                match handle.page_text(page) {
                    Ok(text) => {
                        let tables = handle.page_tables(page).unwrap_or_default();
                        PageOutcome::Page(PageExtract {
                            page,
                            text: text.text,
                            ocr_used: text.ocr_used,
                            ocr_confidence: text.ocr_confidence,
                            tables,
                        })
                    }
                    Err(Error::OcrUnavailable(p)) => PageOutcome::OcrUnavailable(p),
                    Err(Error::Cancelled) => PageOutcome::Cancelled,
                    Err(e) => PageOutcome::Failed {
                        page,
                        reason: e.to_string(),
                    },
                }
            }
        })
        .buffered(workers);

    futures::pin_mut!(fetches);
    while let Some(outcome) = fetches.next().await {
        let stop = matches!(outcome, PageOutcome::Cancelled);
        if tx.send(outcome).await.is_err() || stop {
            break;
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    (done * 100 / total.max(1)) as u8
}

/// Reachability probe for the local model server
async fn probe_local_provider(base_url: &str) -> bool {
    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    else {
        return false;
    };
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// One section per page; the first line becomes the title when it is
/// long enough to mean something
fn section_from_page(page: PageExtract, enhanced: String) -> Section {
    let first_line = page.text.lines().next().unwrap_or("").trim();
    let title = if first_line.len() > 10 {
        let mut end = first_line.len().min(100);
        while end > 0 && !first_line.is_char_boundary(end) {
            end -= 1;
        }
        first_line[..end].to_string()
    } else {
        format!("Page {}", page.page)
    };
    let word_count = enhanced.split_whitespace().count();
    Section {
        page: page.page,
        ordinal: 0,
        title,
        raw_text: page.text,
        enhanced_text: enhanced,
        category: UNCATEGORIZED.to_string(),
        category_confidence: 0.0,
        has_tables: !page.tables.is_empty(),
        tables: page.tables,
        word_count,
        ocr_used: page.ocr_used,
        ocr_confidence: page.ocr_confidence,
    }
}

fn terminal_stage_for(error: &Error) -> Stage {
    match error {
        Error::StoreUnreachable(_) | Error::StoreConflict(_) | Error::StoreOversize(_) => {
            Stage::FailedPersistence
        }
        Error::CatalogMissing(_)
        | Error::AiMalformed(_)
        | Error::AiUnreachable(_)
        | Error::AiTimeout(_)
        | Error::ProviderUnauthorized(_) => Stage::FailedIdentification,
        _ => Stage::FailedExtraction,
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Simple content tags over common tabletop terms, at most ten
fn content_tags(text: &str) -> Vec<String> {
    const TERMS: &[&str] = &[
        "combat", "spell", "magic", "weapon", "armor", "character", "monster", "dungeon",
        "treasure", "experience", "level", "class", "race", "ability", "skill", "feat", "item",
    ];
    let lower = text.to_lowercase();
    TERMS
        .iter()
        .filter(|t| lower.contains(**t))
        .take(10)
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_stage_mapping_matches_taxonomy() {
        assert_eq!(
            terminal_stage_for(&Error::StoreUnreachable("x".into())),
            Stage::FailedPersistence
        );
        assert_eq!(
            terminal_stage_for(&Error::AiUnreachable("x".into())),
            Stage::FailedIdentification
        );
        assert_eq!(
            terminal_stage_for(&Error::PageFailed {
                page: 1,
                reason: "x".into()
            }),
            Stage::FailedExtraction
        );
    }

    #[test]
    fn content_tags_are_bounded() {
        let text = "combat spell magic weapon armor character monster dungeon treasure \
                    experience level class race ability skill feat item";
        assert_eq!(content_tags(text).len(), 10);
    }
}

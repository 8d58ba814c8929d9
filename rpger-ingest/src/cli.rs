//! Command-line surface
//!
//! `extract` runs one document to a terminal state, `batch` walks a
//! directory, `status` prints health and recent sessions, `serve`
//! starts the HTTP surface. Exit codes follow the error taxonomy:
//! 0 success, 2 usage, 3 identification, 4 extraction, 5 persistence,
//! 6 duplicate rejection, 130 cancelled.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rpger_common::config::Config;
use rpger_common::{Error, Result};
use serde_json::json;

use crate::addresser::{address, Layout};
use crate::ai::ProviderKind;
use crate::enhance::EnhanceMode;
use crate::identify::Overrides;
use crate::models::{Artifact, ContentKind};
use crate::pdf::LopdfBackend;
use crate::pipeline::{ExtractOptions, Orchestrator};
use crate::store::{
    DocumentStore, HttpDocumentStore, HttpVectorStore, MemoryDocumentStore, MemoryVectorStore,
    VectorStore,
};
use crate::{build_router, AppState};

#[derive(Debug, Parser)]
#[command(name = "rpger", about = "AI-assisted TTRPG PDF extraction", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ExtractFlags {
    /// AI provider
    #[arg(long, default_value = "mock")]
    pub provider: ProviderKind,

    /// Override the detected game system
    #[arg(long)]
    pub game: Option<String>,

    /// Override the detected edition
    #[arg(long)]
    pub edition: Option<String>,

    /// Override the detected book code
    #[arg(long)]
    pub book: Option<String>,

    /// Content kind hint
    #[arg(long, default_value = "source_material")]
    pub kind: ContentKind,

    /// Persisted-state layout
    #[arg(long, default_value = "separate")]
    pub layout: Layout,

    /// Text enhancement mode
    #[arg(long, default_value = "normal")]
    pub enhance: EnhanceMode,

    /// Also write artifact JSON files into this directory
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract one PDF into the backing stores
    Extract {
        /// Path to the PDF
        pdf: PathBuf,
        #[command(flatten)]
        flags: ExtractFlags,
    },

    /// Extract every .pdf in a directory, one session each
    Batch {
        /// Directory to walk
        dir: PathBuf,
        #[command(flatten)]
        flags: ExtractFlags,
    },

    /// Print store health and recent sessions
    Status,

    /// Start the HTTP session surface
    Serve {
        /// Listen port; falls back to RPGER_PORT, then 5780
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Build the orchestrator from configuration
///
/// Stores without a configured URL run on the in-memory adapters so an
/// unconfigured `rpger extract x.pdf --provider=mock` still completes.
pub fn build_orchestrator(config: &Config) -> Arc<Orchestrator> {
    let vector: Arc<dyn VectorStore> = match &config.vector_store_url {
        Some(url) => match HttpVectorStore::new(url) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "Vector store client failed to build; using memory store");
                Arc::new(MemoryVectorStore::new())
            }
        },
        None => {
            tracing::info!("VECTOR_STORE_URL unset; using in-memory vector store");
            Arc::new(MemoryVectorStore::new())
        }
    };
    let document: Arc<dyn DocumentStore> = match &config.document_store_url {
        Some(url) => match HttpDocumentStore::new(url) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "Document store client failed to build; using memory store");
                Arc::new(MemoryDocumentStore::new())
            }
        },
        None => {
            tracing::info!("DOCUMENT_STORE_URL unset; using in-memory document store");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    Arc::new(Orchestrator::new(
        config.clone(),
        Arc::new(LopdfBackend),
        vector,
        document,
    ))
}

/// Run one file through the full pipeline; returns the artifact
async fn run_one(
    orchestrator: &Orchestrator,
    pdf: &Path,
    flags: &ExtractFlags,
) -> Result<Artifact> {
    let bytes = tokio::fs::read(pdf).await?;
    let origin = pdf
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.pdf".to_string());

    let id = orchestrator.upload(bytes, &origin).await?;
    let overrides = Overrides {
        game: flags.game.clone(),
        edition: flags.edition.clone(),
        book: flags.book.clone(),
        kind: None,
    };
    let verdict = orchestrator
        .analyze(id, flags.provider, flags.kind, &overrides)
        .await?;

    println!(
        "{}: {} {} {} ({:?}, confidence {:.2})",
        origin, verdict.game, verdict.edition, verdict.book, verdict.derivation, verdict.confidence
    );

    orchestrator
        .extract(
            id,
            ExtractOptions {
                enhance: flags.enhance,
                layout: flags.layout,
            },
        )
        .await?;

    orchestrator
        .registry()
        .with_session(id, |s| s.artifact.clone())
        .await?
        .ok_or_else(|| Error::Internal("completed session carries no artifact".into()))
}

/// `extract` command
pub async fn cmd_extract(config: &Config, pdf: &Path, flags: &ExtractFlags) -> Result<()> {
    let orchestrator = build_orchestrator(config);
    let artifact = run_one(&orchestrator, pdf, flags).await?;

    println!(
        "  {} sections, {} words, {} tables, grade {}",
        artifact.counts.sections,
        artifact.counts.words,
        artifact.counts.tables,
        artifact.confidence.grade
    );

    if let Some(dir) = &flags.out {
        write_artifact_files(dir, &artifact, flags.layout).await?;
        println!("  wrote artifact files to {}", dir.display());
    }
    Ok(())
}

/// `batch` command; exit is 0 iff every session completed or was a
/// duplicate rejection
pub async fn cmd_batch(config: &Config, dir: &Path, flags: &ExtractFlags) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::Config(format!("not a directory: {}", dir.display())));
    }
    let mut pdfs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    if pdfs.is_empty() {
        return Err(Error::Config(format!(
            "no .pdf files under {}",
            dir.display()
        )));
    }

    let orchestrator = build_orchestrator(config);
    let total = pdfs.len();
    let mut completed = 0usize;
    let mut duplicates = 0usize;
    let mut failed = 0usize;

    for pdf in &pdfs {
        match run_one(&orchestrator, pdf, flags).await {
            Ok(artifact) => {
                completed += 1;
                println!(
                    "  ok: {} sections, grade {}",
                    artifact.counts.sections, artifact.confidence.grade
                );
            }
            Err(Error::RejectedDuplicate { isbn, first_ingested }) => {
                duplicates += 1;
                println!("  duplicate: ISBN {isbn} first ingested {first_ingested}");
            }
            Err(e) => {
                failed += 1;
                eprintln!("  failed ({}): {e}", e.code());
            }
        }
    }

    println!("batch: {completed} completed, {duplicates} duplicates, {failed} failed of {total}");
    if failed > 0 {
        return Err(Error::Internal(format!("{failed} of {total} sessions failed")));
    }
    Ok(())
}

/// `status` command
pub async fn cmd_status(config: &Config) -> Result<()> {
    let orchestrator = build_orchestrator(config);
    let health = orchestrator.health().await;

    println!("vector store:   {:?}", health.vector_store);
    println!("document store: {:?}", health.document_store);
    for (name, status) in &health.providers {
        println!("provider {name}: {status}");
    }

    let recent = orchestrator.registry().recent(10).await;
    if recent.is_empty() {
        println!("no recent sessions");
    }
    for snapshot in recent {
        println!(
            "{}  {}  {}  {}%",
            snapshot.session_id, snapshot.origin_name, snapshot.stage, snapshot.percent
        );
    }
    Ok(())
}

/// `serve` command
pub async fn cmd_serve(config: &Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.port);
    let orchestrator = build_orchestrator(config);

    // Background sweeper for expired terminal sessions
    tokio::spawn(
        orchestrator
            .registry()
            .run_sweeper(config.session_ttl_seconds),
    );

    let state = AppState::new(orchestrator);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "Listening on http://127.0.0.1:{port}");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(e.to_string()))
}

/// Write the raw artifact, vector-ready documents, and summary files
async fn write_artifact_files(dir: &Path, artifact: &Artifact, layout: Layout) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let addr = address(&artifact.verdict, layout);
    let base = &addr.leaf;

    let raw = serde_json::to_vec_pretty(artifact)
        .map_err(|e| Error::Internal(format!("serialize artifact: {e}")))?;
    tokio::fs::write(dir.join(format!("{base}_raw.json")), raw).await?;

    let vector_docs: Vec<serde_json::Value> = artifact
        .sections
        .iter()
        .map(|s| {
            json!({
                "id": s.record_id(base),
                "document": s.enhanced_text,
                "metadata": {
                    "title": s.title,
                    "page": s.page,
                    "ordinal": s.ordinal,
                    "category": s.category,
                    "word_count": s.word_count,
                    "has_tables": s.has_tables,
                },
            })
        })
        .collect();
    let vector = serde_json::to_vec_pretty(&vector_docs)
        .map_err(|e| Error::Internal(format!("serialize vector docs: {e}")))?;
    tokio::fs::write(dir.join(format!("{base}_vector.json")), vector).await?;

    let summary = serde_json::to_vec_pretty(&json!({
        "collection": addr.collection,
        "folder_path": addr.folder_path,
        "counts": artifact.counts,
        "confidence": artifact.confidence,
        "quality": artifact.quality,
        "ingested_at": artifact.ingested_at,
    }))
    .map_err(|e| Error::Internal(format!("serialize summary: {e}")))?;
    tokio::fs::write(dir.join(format!("{base}_summary.json")), summary).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceReport;
    use crate::models::{
        Artifact, ContentKind, Derivation, QualityMetrics, Section, Verdict,
    };

    fn small_artifact() -> Artifact {
        let sections = vec![Section {
            page: 1,
            ordinal: 0,
            title: "COMBAT".into(),
            raw_text: "raw".into(),
            enhanced_text: "The character makes a saving throw.".into(),
            category: "Combat".into(),
            category_confidence: 0.9,
            has_tables: false,
            tables: Vec::new(),
            word_count: 6,
            ocr_used: false,
            ocr_confidence: None,
        }];
        Artifact {
            verdict: Verdict {
                kind: ContentKind::SourceMaterial,
                game: "dnd".into(),
                edition: "1st".into(),
                book: "phb".into(),
                book_title: "Player's Handbook".into(),
                publisher: None,
                isbn_10: None,
                isbn_13: None,
                confidence: 0.95,
                rationale: "test".into(),
                derivation: Derivation::ExplicitTitle,
                extra: Default::default(),
            },
            counts: Artifact::tally(&sections),
            sections,
            confidence: ConfidenceReport::default(),
            quality: QualityMetrics::default(),
            characters: Vec::new(),
            character_relationships: Default::default(),
            ingested_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn out_dir_receives_the_three_artifact_files() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = small_artifact();
        write_artifact_files(dir.path(), &artifact, Layout::Separate)
            .await
            .unwrap();

        for suffix in ["raw", "vector", "summary"] {
            let path = dir.path().join(format!("dnd_1st_phb_{suffix}.json"));
            assert!(path.exists(), "missing {}", path.display());
        }

        let vector: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("dnd_1st_phb_vector.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(vector[0]["id"], "dnd_1st_phb_page1_0");
    }
}

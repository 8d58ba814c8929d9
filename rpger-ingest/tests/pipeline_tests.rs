//! End-to-end pipeline scenarios over the scripted backend, the mock
//! provider, and the in-memory stores

mod common;

use common::{ambiguous_rulebook, fixture, fixture_with, novel, players_handbook, NOVEL_NAMES};
use rpger_common::config::Config;
use rpger_common::events::{SessionEvent, Stage};
use rpger_common::Error;
use rpger_ingest::addresser::Layout;
use rpger_ingest::ai::ProviderKind;
use rpger_ingest::enhance::EnhanceMode;
use rpger_ingest::identify::Overrides;
use rpger_ingest::models::{ContentKind, Derivation};
use rpger_ingest::pipeline::ExtractOptions;
use rpger_ingest::store::MemoryVectorStore;
use std::collections::HashMap;

async fn run_to_completion(
    fx: &common::Fixture,
    provider: ProviderKind,
    kind: ContentKind,
    overrides: Overrides,
    opts: ExtractOptions,
) -> rpger_common::Result<uuid::Uuid> {
    let id = fx
        .orchestrator
        .upload(b"scripted bytes".to_vec(), "book.pdf")
        .await?;
    fx.orchestrator.analyze(id, provider, kind, &overrides).await?;
    fx.orchestrator.extract(id, opts).await?;
    Ok(id)
}

// Scenario 1: clean source material with an explicit title page
#[tokio::test]
async fn clean_source_material_lands_in_both_stores() {
    let fx = fixture(players_handbook());
    let id = fx
        .orchestrator
        .upload(b"scripted".to_vec(), "phb.pdf")
        .await
        .unwrap();

    let verdict = fx
        .orchestrator
        .analyze(
            id,
            ProviderKind::Mock,
            ContentKind::SourceMaterial,
            &Overrides::default(),
        )
        .await
        .unwrap();
    assert_eq!(verdict.kind, ContentKind::SourceMaterial);
    assert_eq!(verdict.game, "dnd");
    assert_eq!(verdict.edition, "1st");
    assert_eq!(verdict.book, "phb");
    assert_eq!(verdict.derivation, Derivation::ExplicitTitle);
    assert!(verdict.confidence >= 0.95);

    fx.orchestrator
        .extract(id, ExtractOptions::default())
        .await
        .unwrap();

    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Completed);

    // >= 100 sections in the vector collection named by the leaf
    use rpger_ingest::store::VectorStore;
    let count = fx.vector.count("dnd_1st_phb").await.unwrap();
    assert!(count >= 100, "vector records: {count}");
    let sample = fx.vector.sample("dnd_1st_phb", 1).await.unwrap();
    assert_eq!(sample[0].metadata["game"], "dnd");
    assert_eq!(sample[0].metadata["kind"], "source_material");

    // Split-section documents under the dotted path, grade B or better
    use rpger_ingest::store::DocumentStore;
    let page = fx
        .document
        .page("source_material.dnd.1st.phb.dnd_1st_phb", 0, 5, None)
        .await
        .unwrap();
    assert!(page.total >= 100, "document records: {page:?}");

    let artifact = fx
        .orchestrator
        .registry()
        .with_session(id, |s| s.artifact.clone())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(artifact.confidence.grade, 'A' | 'B'));
    assert_eq!(artifact.verdict.isbn_13.as_deref(), Some("9780306406157"));
}

// Scenario 1, single layout: folder path carries the hierarchy
#[tokio::test]
async fn single_layout_uses_the_shared_collection() {
    let fx = fixture(players_handbook());
    let id = run_to_completion(
        &fx,
        ProviderKind::Mock,
        ContentKind::SourceMaterial,
        Overrides::default(),
        ExtractOptions {
            enhance: EnhanceMode::Normal,
            layout: Layout::SingleWithFolder,
        },
    )
    .await
    .unwrap();

    use rpger_ingest::store::DocumentStore;
    let page = fx.document.page("rpger", 0, 5, None).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(
        page.docs[0]["folder_path"],
        "source_material/dnd/1st/phb/dnd_1st_phb"
    );
    assert!(page.docs[0]["sections"].as_array().unwrap().len() >= 100);

    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Completed);
}

// Scenario 2: no exact title, clear system vocabulary
#[tokio::test]
async fn ambiguous_rulebook_resolves_via_provider() {
    let fx = fixture(ambiguous_rulebook());
    let id = fx
        .orchestrator
        .upload(b"scripted".to_vec(), "mystery.pdf")
        .await
        .unwrap();
    let verdict = fx
        .orchestrator
        .analyze(
            id,
            ProviderKind::Mock,
            ContentKind::SourceMaterial,
            &Overrides::default(),
        )
        .await
        .unwrap();
    assert_eq!(verdict.derivation, Derivation::AiInference);
    assert_eq!(verdict.game, "dnd");
    assert!(verdict.confidence > 0.0 && verdict.confidence <= 0.95);

    fx.orchestrator
        .extract(id, ExtractOptions::default())
        .await
        .unwrap();
    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Completed);
}

// Scenario 2, provider forced offline: keyword fallback still persists
#[tokio::test]
async fn offline_provider_degrades_to_keyword_fallback() {
    let config = Config {
        // Nothing listens here; connection refusal is immediate
        local_provider_url: "http://127.0.0.1:9".to_string(),
        ai_retries: 0,
        ai_timeout_ms: 2_000,
        ..Config::default()
    };
    let fx = fixture_with(ambiguous_rulebook(), config, MemoryVectorStore::new());
    let id = fx
        .orchestrator
        .upload(b"scripted".to_vec(), "mystery.pdf")
        .await
        .unwrap();
    let verdict = fx
        .orchestrator
        .analyze(
            id,
            ProviderKind::Local,
            ContentKind::SourceMaterial,
            &Overrides::default(),
        )
        .await
        .unwrap();
    assert_eq!(verdict.derivation, Derivation::FallbackKeyword);
    assert!(verdict.confidence <= 0.6);

    fx.orchestrator
        .extract(id, ExtractOptions::default())
        .await
        .unwrap();
    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Completed);
}

// Scenario 3: sequential duplicate ingest is rejected
#[tokio::test]
async fn second_ingest_of_the_same_isbn_is_rejected() {
    let fx = fixture(players_handbook());
    run_to_completion(
        &fx,
        ProviderKind::Mock,
        ContentKind::SourceMaterial,
        Overrides::default(),
        ExtractOptions::default(),
    )
    .await
    .unwrap();

    let id2 = fx
        .orchestrator
        .upload(b"scripted".to_vec(), "phb-again.pdf")
        .await
        .unwrap();
    fx.orchestrator
        .analyze(
            id2,
            ProviderKind::Mock,
            ContentKind::SourceMaterial,
            &Overrides::default(),
        )
        .await
        .unwrap();
    let err = fx
        .orchestrator
        .extract(id2, ExtractOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::RejectedDuplicate { isbn, first_ingested } => {
            assert_eq!(isbn, "9780306406157");
            assert!(!first_ingested.is_empty());
        }
        other => panic!("expected duplicate rejection, got {other:?}"),
    }

    let snapshot = fx.orchestrator.registry().snapshot(id2).await.unwrap();
    assert_eq!(snapshot.stage, Stage::RejectedDuplicate);
}

// Scenario 4: concurrent duplicates; exactly one completes
#[tokio::test]
async fn concurrent_duplicate_ingests_admit_exactly_one() {
    let fx = fixture(players_handbook());

    let mut ids = Vec::new();
    for i in 0..2 {
        let id = fx
            .orchestrator
            .upload(b"scripted".to_vec(), &format!("phb-{i}.pdf"))
            .await
            .unwrap();
        fx.orchestrator
            .analyze(
                id,
                ProviderKind::Mock,
                ContentKind::SourceMaterial,
                &Overrides::default(),
            )
            .await
            .unwrap();
        ids.push(id);
    }

    let (a, b) = tokio::join!(
        fx.orchestrator.extract(ids[0], ExtractOptions::default()),
        fx.orchestrator.extract(ids[1], ExtractOptions::default()),
    );

    let outcomes = [a, b];
    let completed = outcomes.iter().filter(|r| r.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|r| matches!(r, Err(Error::RejectedDuplicate { .. })))
        .count();
    assert_eq!(completed, 1, "outcomes: {outcomes:?}");
    assert_eq!(rejected, 1, "outcomes: {outcomes:?}");
}

// Scenario 5: novel ingest with the character pass
#[tokio::test]
async fn novel_ingest_discovers_principal_characters() {
    let fx = fixture(novel());
    let overrides = Overrides {
        game: Some("dnd".into()),
        edition: Some("1st".into()),
        book: Some("phb".into()),
        kind: None,
    };
    let id = run_to_completion(
        &fx,
        ProviderKind::Mock,
        ContentKind::Novel,
        overrides,
        ExtractOptions::default(),
    )
    .await
    .unwrap();

    let artifact = fx
        .orchestrator
        .registry()
        .with_session(id, |s| s.artifact.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.verdict.kind, ContentKind::Novel);
    assert!(
        artifact.characters.len() >= 12,
        "characters: {:?}",
        artifact.characters.iter().map(|c| &c.name).collect::<Vec<_>>()
    );
    assert!(artifact.characters.iter().all(|c| !c.name.is_empty()));
    for name in NOVEL_NAMES {
        assert!(
            artifact.characters.iter().any(|c| c.name == *name),
            "missing {name}"
        );
    }
    // Every principal appears on at least three distinct pages
    assert!(artifact.characters.iter().all(|c| c.pages.len() >= 3));
}

// Scenario 6: vector store outage degrades to partial persistence
#[tokio::test]
async fn single_store_outage_completes_with_partial_note() {
    let vector = MemoryVectorStore::new();
    vector.set_offline(true);
    let fx = fixture_with(players_handbook(), Config::default(), vector);

    let id = run_to_completion(
        &fx,
        ProviderKind::Mock,
        ContentKind::SourceMaterial,
        Overrides::default(),
        ExtractOptions::default(),
    )
    .await
    .unwrap();

    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Completed);
    assert!(
        snapshot.note.as_deref().unwrap_or("").contains("partial_persistence"),
        "note: {:?}",
        snapshot.note
    );

    // The document store still committed
    use rpger_ingest::store::DocumentStore;
    let page = fx
        .document
        .page("source_material.dnd.1st.phb.dnd_1st_phb", 0, 1, None)
        .await
        .unwrap();
    assert!(page.total >= 100);

    // And health reports the vector store down
    let health = fx.orchestrator.health().await;
    assert_eq!(health.vector_store, rpger_ingest::store::StoreHealth::Down);
    assert_eq!(health.document_store, rpger_ingest::store::StoreHealth::Ok);
}

// Both stores down is a terminal persistence failure
#[tokio::test]
async fn dual_store_outage_fails_persistence() {
    let vector = MemoryVectorStore::new();
    vector.set_offline(true);
    let fx = fixture_with(players_handbook(), Config::default(), vector);
    fx.document.set_offline(true);

    let id = fx
        .orchestrator
        .upload(b"scripted".to_vec(), "phb.pdf")
        .await
        .unwrap();
    fx.orchestrator
        .analyze(
            id,
            ProviderKind::Mock,
            ContentKind::SourceMaterial,
            &Overrides::default(),
        )
        .await
        .unwrap();
    let err = fx
        .orchestrator
        .extract(id, ExtractOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "store_unreachable");

    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::FailedPersistence);
}

// Per-page failures degrade without failing the run: skipped pages are
// counted in the metrics and every surviving page still streams through
// to a persisted section
#[tokio::test]
async fn mixed_page_failures_degrade_without_failing() {
    use rpger_ingest::pdf::{ScriptedBackend, ScriptedPage};

    let mut pages = vec![ScriptedPage::text(
        "Advanced Dungeons & Dragons\n\nPlayer's Handbook",
    )];
    for i in 2usize..=10 {
        let page = match i {
            3 => ScriptedPage {
                ocr_unavailable: true,
                ..Default::default()
            },
            7 => ScriptedPage {
                fail: true,
                ..Default::default()
            },
            _ => ScriptedPage::text(common::page_body(i)),
        };
        pages.push(page);
    }
    let fx = fixture(ScriptedBackend::new(pages));

    let id = run_to_completion(
        &fx,
        ProviderKind::Mock,
        ContentKind::SourceMaterial,
        Overrides::default(),
        ExtractOptions::default(),
    )
    .await
    .unwrap();

    let artifact = fx
        .orchestrator
        .registry()
        .with_session(id, |s| s.artifact.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.quality.pages_ocr_unavailable, 1);
    assert_eq!(artifact.quality.pages_failed, 1);
    assert_eq!(artifact.sections.len(), 8);
    let pages_seen: Vec<u32> = artifact.sections.iter().map(|s| s.page).collect();
    assert!(!pages_seen.contains(&3));
    assert!(!pages_seen.contains(&7));

    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Completed);
}

// Ordering property: persisted sections equal the (page, ordinal) sort
#[tokio::test]
async fn sections_persist_in_page_order() {
    let fx = fixture(players_handbook());
    let id = run_to_completion(
        &fx,
        ProviderKind::Mock,
        ContentKind::SourceMaterial,
        Overrides::default(),
        ExtractOptions::default(),
    )
    .await
    .unwrap();

    let artifact = fx
        .orchestrator
        .registry()
        .with_session(id, |s| s.artifact.clone())
        .await
        .unwrap()
        .unwrap();
    let mut sorted = artifact.sections.clone();
    sorted.sort_by_key(|s| (s.page, s.ordinal));
    let got: Vec<(u32, u32)> = artifact.sections.iter().map(|s| (s.page, s.ordinal)).collect();
    let want: Vec<(u32, u32)> = sorted.iter().map(|s| (s.page, s.ordinal)).collect();
    assert_eq!(got, want);
}

// Progress events are stage-ordered with monotone percent per stage
#[tokio::test]
async fn progress_events_are_monotone() {
    let fx = fixture(players_handbook());
    let id = fx
        .orchestrator
        .upload(b"scripted".to_vec(), "phb.pdf")
        .await
        .unwrap();
    fx.orchestrator
        .analyze(
            id,
            ProviderKind::Mock,
            ContentKind::SourceMaterial,
            &Overrides::default(),
        )
        .await
        .unwrap();

    let mut rx = fx.orchestrator.bus().subscribe();
    fx.orchestrator
        .extract(id, ExtractOptions::default())
        .await
        .unwrap();

    let mut last_stage_index = 0u8;
    let mut last_percent: HashMap<Stage, u8> = HashMap::new();
    let mut saw_terminal = false;
    loop {
        let event = match rx.try_recv() {
            Ok(event) => event,
            // Delivery is best-effort: a lagged subscriber drops events
            // but never sees them out of order.
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        };
        if event.session_id() != id {
            continue;
        }
        assert!(!saw_terminal, "event after terminal: {event:?}");
        match &event {
            SessionEvent::StageChanged { stage, .. } => {
                assert!(stage.index() >= last_stage_index);
                last_stage_index = stage.index();
            }
            SessionEvent::Progress { stage, percent, .. } => {
                let previous = last_percent.entry(*stage).or_insert(0);
                assert!(
                    *percent >= *previous,
                    "percent regressed in {stage}: {percent} < {previous}"
                );
                *previous = *percent;
            }
            _ => {}
        }
        if event.is_terminal() {
            saw_terminal = true;
        }
    }
    assert!(saw_terminal, "no terminal event observed");
}

// Cancellation before extraction is observed at the first stage boundary
#[tokio::test]
async fn cancelled_session_rolls_back_its_claim() {
    let fx = fixture(players_handbook());
    let id = fx
        .orchestrator
        .upload(b"scripted".to_vec(), "phb.pdf")
        .await
        .unwrap();
    fx.orchestrator
        .analyze(
            id,
            ProviderKind::Mock,
            ContentKind::SourceMaterial,
            &Overrides::default(),
        )
        .await
        .unwrap();

    fx.orchestrator.registry().cancel(id).await.unwrap();
    let err = fx
        .orchestrator
        .extract(id, ExtractOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "cancelled");

    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Cancelled);

    // The tentative registry claim was rolled back, so a fresh ingest
    // of the same ISBN succeeds.
    let fresh = run_to_completion(
        &fx,
        ProviderKind::Mock,
        ContentKind::SourceMaterial,
        Overrides::default(),
        ExtractOptions::default(),
    )
    .await;
    assert!(fresh.is_ok(), "{fresh:?}");
}

// Oversize vector values retry once at 95% length
#[tokio::test]
async fn oversize_vector_values_truncate_and_retry() {
    // Pilot run to learn the enhanced section length
    let backend = ambiguous_rulebook;
    let pilot = fixture(backend());
    let pilot_id = run_to_completion(
        &pilot,
        ProviderKind::Mock,
        ContentKind::SourceMaterial,
        Overrides::default(),
        ExtractOptions::default(),
    )
    .await
    .unwrap();
    let longest = pilot
        .orchestrator
        .registry()
        .with_session(pilot_id, |s| {
            s.artifact
                .as_ref()
                .map(|a| a.sections.iter().map(|s| s.enhanced_text.len()).max().unwrap_or(0))
        })
        .await
        .unwrap()
        .unwrap();
    assert!(longest > 40);

    // A limit just under the longest value forces one oversize failure;
    // the 95% retry fits.
    let vector = MemoryVectorStore::with_value_limit(longest - 1);
    let fx = fixture_with(backend(), Config::default(), vector);
    let id = run_to_completion(
        &fx,
        ProviderKind::Mock,
        ContentKind::SourceMaterial,
        Overrides::default(),
        ExtractOptions::default(),
    )
    .await
    .unwrap();

    let snapshot = fx.orchestrator.registry().snapshot(id).await.unwrap();
    assert_eq!(snapshot.stage, Stage::Completed);
    assert!(snapshot.note.is_none(), "note: {:?}", snapshot.note);

    use rpger_ingest::store::VectorStore;
    let count = fx.vector.count("dnd_1st_phb").await.unwrap();
    assert!(count > 0);
}

//! Shared fixtures for the integration tests
//!
//! Builds orchestrators over the scripted PDF backend, the mock
//! provider, and the in-memory stores, plus scripted documents for the
//! end-to-end scenarios.
#![allow(dead_code)]

use std::sync::Arc;

use rpger_common::config::Config;
use rpger_ingest::pdf::{ScriptedBackend, ScriptedPage};
use rpger_ingest::pipeline::Orchestrator;
use rpger_ingest::store::{MemoryDocumentStore, MemoryVectorStore};

pub struct Fixture {
    pub orchestrator: Arc<Orchestrator>,
    pub vector: Arc<MemoryVectorStore>,
    pub document: Arc<MemoryDocumentStore>,
}

pub fn fixture(backend: ScriptedBackend) -> Fixture {
    fixture_with(backend, Config::default(), MemoryVectorStore::new())
}

pub fn fixture_with(
    backend: ScriptedBackend,
    config: Config,
    vector: MemoryVectorStore,
) -> Fixture {
    let vector = Arc::new(vector);
    let document = Arc::new(MemoryDocumentStore::new());
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::new(backend),
        vector.clone(),
        document.clone(),
    ));
    Fixture {
        orchestrator,
        vector,
        document,
    }
}

/// A clean 124-page source-material book whose first page carries the
/// literal title "Player's Handbook" and whose last page carries an ISBN
pub fn players_handbook() -> ScriptedBackend {
    let mut pages = vec![ScriptedPage::text(
        "Advanced Dungeons & Dragons\n\nPlayer's Handbook\n\nA compendium of rules for the dungeon master and player",
    )];
    for i in 2..124 {
        pages.push(ScriptedPage::text(page_body(i)));
    }
    pages.push(ScriptedPage::text(
        "Printed by the publisher.\n\nISBN 0-306-40615-2. All rights reserved.",
    ));
    ScriptedBackend::new(pages)
}

/// Clean, structured rule text keyed off the page number
pub fn page_body(i: usize) -> String {
    let topic = match i % 4 {
        0 => "COMBAT\n\nThe character makes an attack roll against the armor class of the target. \
              Damage is rolled on the table and applied to the creature.",
        1 => "MAGIC\n\nA spell is cast by the character once per round. The magic takes effect \
              at the start of the next turn and the target makes a saving throw.",
        2 => "EQUIPMENT\n\nEach item of equipment has a cost in gold and a weight. The character \
              may wield one weapon and wear one suit of armor at a time.",
            _ => "RULES\n\nThe referee rolls the dice behind the screen. A result equal to the \
              target number or higher is a success for the character.",
    };
    format!("{topic}\n\nSection notes for page {i} complete the chapter.")
}

/// A rulebook with clear system vocabulary but no explicit title
pub fn ambiguous_rulebook() -> ScriptedBackend {
    let mut pages = vec![ScriptedPage::text(
        "A game of fantasy adventure.\n\nThe dungeon master adjudicates each saving throw; \
         consult THAC0 for the attack roll and armor class for defense. Beware the beholder.",
    )];
    for i in 2..=30 {
        pages.push(ScriptedPage::text(page_body(i)));
    }
    ScriptedBackend::new(pages)
}

pub const NOVEL_NAMES: &[&str] = &[
    "Varek", "Mira", "Dorn", "Kessa", "Talin", "Brakka", "Ishara", "Fenwick", "Oren", "Sylvana",
    "Quist", "Maro",
];

/// A novel whose twelve principals each appear mid-sentence on every page
pub fn novel() -> ScriptedBackend {
    let mut pages = Vec::new();
    pages.push(ScriptedPage::text(
        "The Road North\n\nA novel of the borderlands. First published by the press.\n\nISBN 978-0-306-40615-7",
    ));
    for page in 0..6 {
        let mut text = String::from("CHAPTER\n\n");
        for name in NOVEL_NAMES {
            text.push_str(&format!(
                "Then {name} walked the road beside the river at dusk. \
                 Old friends saw {name} near the gate and said, \"The road is long.\" "
            ));
        }
        text.push_str(&format!("So ended the hours of day {}.", page + 1));
        pages.push(ScriptedPage::text(text));
    }
    ScriptedBackend::new(pages)
}

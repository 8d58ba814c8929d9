//! Game catalog: static registry of supported game systems
//!
//! Provides editions, book codes, weighted detection keywords, content
//! category taxonomies, and the book-title synonym table used by the
//! explicit-title shortcut. Read-only after startup and safe for
//! concurrent reads.

mod data;

use std::sync::LazyLock;

use rpger_common::{Error, Result};

use crate::models::ContentKind;

/// A detection keyword with its vote weight
#[derive(Debug, Clone, Copy)]
pub struct Keyword {
    pub term: &'static str,
    pub weight: f64,
}

/// A known book within an edition
#[derive(Debug, Clone, Copy)]
pub struct Book {
    /// Book code, e.g. `phb`
    pub code: &'static str,
    /// Display title, e.g. `Player's Handbook`
    pub title: &'static str,
}

/// An edition of a game system
#[derive(Debug, Clone)]
pub struct Edition {
    pub id: &'static str,
    pub books: Vec<Book>,
}

/// A supported game system
#[derive(Debug, Clone)]
pub struct GameSystem {
    /// Identifier, e.g. `dnd`
    pub id: &'static str,
    /// Display name, e.g. `Dungeons & Dragons`
    pub name: &'static str,
    /// Collection prefix used by the addresser, e.g. `dnd`
    pub prefix: &'static str,
    /// Ordered known editions
    pub editions: Vec<Edition>,
    pub keywords: Vec<Keyword>,
    /// Ordered source-material categories for this system
    pub categories: Vec<&'static str>,
}

/// A title-synonym entry: normalized fragment to (game, edition, book)
#[derive(Debug, Clone, Copy)]
pub struct TitleSynonym {
    pub fragment: &'static str,
    pub game: &'static str,
    pub edition: &'static str,
    pub book: &'static str,
}

/// The catalog singleton
pub struct Catalog {
    games: Vec<GameSystem>,
    synonyms: Vec<TitleSynonym>,
    novel_categories: Vec<&'static str>,
    protected_terms: Vec<&'static str>,
}

static CATALOG: LazyLock<Catalog> = LazyLock::new(data::build);

/// Access the process-wide catalog
pub fn catalog() -> &'static Catalog {
    &CATALOG
}

impl Catalog {
    pub fn games(&self) -> &[GameSystem] {
        &self.games
    }

    pub fn game(&self, id: &str) -> Option<&GameSystem> {
        self.games.iter().find(|g| g.id == id)
    }

    /// Ordered editions of a game
    pub fn editions(&self, game: &str) -> Result<Vec<&'static str>> {
        let g = self
            .game(game)
            .ok_or_else(|| Error::CatalogMissing(game.to_string()))?;
        Ok(g.editions.iter().map(|e| e.id).collect())
    }

    /// Book codes of an edition; falls back to the first edition's list
    /// when the edition is unknown but the game has one, else
    /// `catalog_missing`.
    pub fn books(&self, game: &str, edition: &str) -> Result<Vec<Book>> {
        let g = self
            .game(game)
            .ok_or_else(|| Error::CatalogMissing(game.to_string()))?;
        if let Some(e) = g.editions.iter().find(|e| e.id == edition) {
            return Ok(e.books.clone());
        }
        g.editions
            .first()
            .map(|e| e.books.clone())
            .ok_or_else(|| Error::CatalogMissing(format!("{game}/{edition}")))
    }

    /// Display title for a book code, if known
    pub fn book_title(&self, game: &str, edition: &str, code: &str) -> Option<&'static str> {
        self.books(game, edition)
            .ok()?
            .iter()
            .find(|b| b.code == code)
            .map(|b| b.title)
    }

    /// Content categories for a kind; source material is game-specific
    pub fn categories(&self, game: &str, kind: ContentKind) -> Vec<&'static str> {
        match kind {
            ContentKind::Novel => self.novel_categories.clone(),
            ContentKind::SourceMaterial => self
                .game(game)
                .map(|g| g.categories.clone())
                .unwrap_or_else(|| data::GENERIC_CATEGORIES.to_vec()),
        }
    }

    /// Title synonyms, normalized fragments
    pub fn synonyms(&self) -> &[TitleSynonym] {
        &self.synonyms
    }

    /// Look up a normalized title fragment
    pub fn synonym(&self, normalized: &str) -> Option<&TitleSynonym> {
        self.synonyms
            .iter()
            .find(|s| normalized.contains(s.fragment))
    }

    /// Game-specific jargon the spell corrector must not touch
    pub fn protected_terms(&self) -> &[&'static str] {
        &self.protected_terms
    }

    /// Keyword vote over a text sample; returns (game id, hit density)
    ///
    /// Density is the weight of matched keywords over the total keyword
    /// weight of the winning game, clamped to [0,1]. Used by the mock
    /// provider and the keyword fallback.
    pub fn keyword_vote(&self, text: &str) -> Option<(&'static str, f64)> {
        let lower = text.to_lowercase();
        let mut best: Option<(&'static str, f64)> = None;
        for game in &self.games {
            let total: f64 = game.keywords.iter().map(|k| k.weight).sum();
            if total == 0.0 {
                continue;
            }
            let hit: f64 = game
                .keywords
                .iter()
                .filter(|k| lower.contains(k.term))
                .map(|k| k.weight)
                .sum();
            let density = (hit / total).clamp(0.0, 1.0);
            if density > 0.0 && best.map_or(true, |(_, d)| density > d) {
                best = Some((game.id, density));
            }
        }
        best
    }
}

/// Case-fold and collapse whitespace for synonym matching
pub fn normalize_title(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_core_games() {
        for id in ["dnd", "pathfinder", "coc", "vampire", "werewolf"] {
            assert!(catalog().game(id).is_some(), "missing game {id}");
        }
    }

    #[test]
    fn unknown_edition_falls_back_to_first() {
        let books = catalog().books("dnd", "99th").unwrap();
        assert!(books.iter().any(|b| b.code == "phb"));
    }

    #[test]
    fn unknown_game_is_catalog_missing() {
        let err = catalog().editions("gurps").unwrap_err();
        assert_eq!(err.code(), "catalog_missing");
    }

    #[test]
    fn players_handbook_synonym_resolves() {
        let normalized = normalize_title("  PLAYER'S   Handbook  ");
        let hit = catalog().synonym(&normalized).expect("synonym");
        assert_eq!(hit.game, "dnd");
        assert_eq!(hit.book, "phb");
    }

    #[test]
    fn keyword_vote_prefers_system_vocabulary() {
        let text = "Roll a saving throw against the beholder; consult THAC0 and armor class.";
        let (game, density) = catalog().keyword_vote(text).unwrap();
        assert_eq!(game, "dnd");
        assert!(density > 0.0 && density <= 1.0);
    }

    #[test]
    fn novel_categories_are_fixed() {
        let cats = catalog().categories("dnd", ContentKind::Novel);
        assert!(cats.contains(&"Dialogue"));
        assert!(cats.contains(&"Internal Monologue"));
    }
}

//! Domain dictionary backing the text enhancer
//!
//! A compact common-English core plus tabletop vocabulary. The spell
//! corrector only ever proposes words from this list, so the list is the
//! ceiling on what correction can do; unknown-but-legitimate words fall
//! through untouched unless they sit within edit distance of an entry.

use std::collections::HashSet;
use std::sync::LazyLock;

use crate::catalog::catalog;

const CORE_WORDS: &[&str] = &[
    // function words
    "a", "an", "and", "any", "are", "as", "at", "be", "been", "before", "but", "by", "can",
    "cannot", "could", "do", "does", "each", "for", "from", "had", "has", "have", "if", "in",
    "into", "is", "it", "its", "may", "more", "most", "must", "no", "not", "of", "off", "on",
    "once", "one", "only", "or", "other", "our", "out", "over", "per", "so", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "those",
    "to", "under", "up", "upon", "use", "used", "uses", "using", "was", "were", "when", "where",
    "which", "while", "who", "whose", "will", "with", "within", "without", "you", "your",
    // general vocabulary
    "ability", "abilities", "action", "actions", "add", "added", "against", "all", "allow",
    "allows", "also", "amount", "apply", "area", "attack", "attacks", "avoid", "base", "based",
    "basic", "battle", "become", "begin", "begins", "between", "bonus", "book", "both", "called",
    "case", "cast", "casting", "cause", "chance", "change", "chapter", "character", "characters",
    "check", "checks", "choose", "class", "classes", "combat", "common", "complete", "cost",
    "create", "creature", "creatures", "damage", "darkness", "death", "defense", "described",
    "description", "determine", "dice", "die", "different", "direction", "distance", "door",
    "down", "draw", "during", "edition", "effect", "effects", "end", "enemy", "equal",
    "equipment", "example", "experience", "extra", "fail", "failure", "fall", "fight", "find",
    "fire", "first", "following", "force", "form", "found", "full", "game", "gain", "gains",
    "give", "given", "gold", "great", "ground", "group", "half", "hand", "harmful", "healing",
    "health", "high", "higher", "hit", "hold", "hour", "however", "human", "initiative",
    "instead", "item", "items", "keep", "kind", "know", "known", "large", "last", "least",
    "left", "less", "level", "levels", "light", "like", "limit", "list", "long", "loss", "low",
    "made", "magic", "magical", "make", "makes", "many", "master", "maximum", "means", "melee",
    "might", "minimum", "minute", "miss", "missile", "mode", "modern", "modifier", "monster",
    "monsters", "move", "movement", "much", "name", "natural", "nature", "near", "need", "new",
    "next", "night", "normal", "note", "number", "often", "open", "order", "page", "party",
    "pass", "people", "place", "plate", "play", "player", "players", "point", "points",
    "poison", "possible", "power", "powers", "race", "races", "range", "ranged", "rate",
    "reach", "read", "reduce", "referee", "remain", "remove", "require", "required", "requires",
    "resist", "resistance", "result", "results", "right", "roll", "rolled", "rolls", "round",
    "rounds", "rule", "rules", "same", "save", "saves", "saving", "score", "scores", "second",
    "section", "see", "set", "several", "shield", "short", "should", "side", "silver", "simple",
    "single", "size", "skill", "skills", "small", "special", "speed", "spell", "spells",
    "standard", "start", "state", "still", "stone", "strength", "strike", "subject", "success",
    "successful", "suffer", "system", "table", "tables", "take", "taken", "takes", "target",
    "terrain", "test", "third", "three", "throw", "throws", "time", "times", "total", "treat",
    "turn", "turns", "two", "type", "types", "until", "value", "various", "very", "wall",
    "water", "weapon", "weapons", "wear", "well", "wield", "world", "would", "wound", "wounds",
    // novel-leaning vocabulary
    "after", "again", "along", "answered", "asked", "away", "back", "behind", "beneath",
    "beside", "came", "chest", "cold", "dark", "dawn", "day", "deep", "door", "dusk", "ended",
    "eyes", "face", "fear", "feet", "felt", "friends", "gate", "gone", "good", "hair", "head",
    "healer", "heard", "heart", "her", "him", "his", "hours", "knew", "left", "look", "looked",
    "man", "met", "moment", "never", "north", "now", "old", "own", "quiet", "replied", "river",
    "road", "room", "said", "saw", "she", "silence", "slowly", "smile", "something", "soon",
    "spoke", "stood", "sword", "thanked", "thought", "through", "told", "toward", "turned",
    "village", "voice", "waited", "walked", "wanted", "warrior", "way", "went", "what",
    "whispered", "woman", "words", "young",
];

/// Dictionary with the catalog's protected jargon folded in
pub struct Dictionary {
    words: HashSet<&'static str>,
    protected: HashSet<&'static str>,
}

static DICTIONARY: LazyLock<Dictionary> = LazyLock::new(|| {
    let mut words: HashSet<&'static str> = CORE_WORDS.iter().copied().collect();
    let protected: HashSet<&'static str> = catalog().protected_terms().iter().copied().collect();
    // Protected jargon counts as known so no pass ever rewrites it
    words.extend(protected.iter().copied());
    Dictionary { words, protected }
});

pub fn dictionary() -> &'static Dictionary {
    &DICTIONARY
}

impl Dictionary {
    /// Membership, case-insensitive over the trimmed alphabetic core
    pub fn contains(&self, token: &str) -> bool {
        let stripped = strip_token(token);
        if stripped.is_empty() {
            // Numbers and bare punctuation are never spelling errors
            return true;
        }
        self.words.contains(stripped.as_str())
    }

    pub fn is_protected(&self, token: &str) -> bool {
        self.protected.contains(strip_token(token).as_str())
    }

    /// Closest dictionary word within `max_distance` edits, if unique enough
    ///
    /// Ties resolve to the shortest candidate, then lexicographically, so
    /// the corrector is deterministic.
    pub fn suggest(&self, token: &str, max_distance: usize) -> Option<&'static str> {
        let stripped = strip_token(token);
        if stripped.len() < 3 {
            return None;
        }
        let mut best: Option<(&'static str, usize)> = None;
        for &word in &self.words {
            if word.len().abs_diff(stripped.len()) > max_distance {
                continue;
            }
            let d = strsim::levenshtein(&stripped, word);
            if d == 0 || d > max_distance {
                continue;
            }
            let better = match best {
                None => true,
                Some((bw, bd)) => d < bd || (d == bd && (word.len(), word) < (bw.len(), bw)),
            };
            if better {
                best = Some((word, d));
            }
        }
        best.map(|(w, _)| w)
    }

    /// Fraction of tokens present in the dictionary, in [0,1]
    pub fn coverage(&self, text: &str) -> f64 {
        let mut total = 0usize;
        let mut hits = 0usize;
        for token in text.split_whitespace() {
            let stripped = strip_token(token);
            if stripped.is_empty() {
                continue;
            }
            total += 1;
            if self.words.contains(stripped.as_str()) {
                hits += 1;
            }
        }
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Lowercase and strip surrounding punctuation; empty for non-alphabetic tokens
pub fn strip_token(token: &str) -> String {
    let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.chars().any(|c| c.is_ascii_digit()) {
        return String::new();
    }
    trimmed.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_numbers_are_known() {
        let d = dictionary();
        assert!(d.contains("saving,"));
        assert!(d.contains("42"));
        assert!(d.contains("--"));
    }

    #[test]
    fn protected_jargon_is_known_and_protected() {
        let d = dictionary();
        assert!(d.contains("THAC0") || d.is_protected("thac0"));
        assert!(d.is_protected("tiefling"));
    }

    #[test]
    fn suggest_fixes_close_misspellings() {
        let d = dictionary();
        assert_eq!(d.suggest("charcter", 2), Some("character"));
        assert_eq!(d.suggest("combta", 2), Some("combat"));
        // Too far off for distance 2
        assert_eq!(d.suggest("zzzzzzzz", 2), None);
    }

    #[test]
    fn coverage_is_one_on_clean_text() {
        let d = dictionary();
        assert!((d.coverage("the character makes a saving throw") - 1.0).abs() < f64::EPSILON);
    }
}

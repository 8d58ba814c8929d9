//! Text quality enhancement
//!
//! OCR-artifact cleanup, spell correction against the domain dictionary,
//! and quality scoring. Every pass is idempotent on already-clean text:
//! a second run over enhanced output changes nothing.

mod dictionary;

pub use dictionary::{dictionary, strip_token, Dictionary};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Enhancement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceMode {
    Off,
    #[default]
    Normal,
    Aggressive,
}

impl std::str::FromStr for EnhanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(EnhanceMode::Off),
            "normal" => Ok(EnhanceMode::Normal),
            "aggressive" => Ok(EnhanceMode::Aggressive),
            other => Err(format!("unknown enhance mode: {other}")),
        }
    }
}

/// Outcome of enhancing one text
#[derive(Debug, Clone)]
pub struct Enhanced {
    pub text: String,
    /// Correction counts by kind
    pub corrections: BTreeMap<String, usize>,
}

/// OCR substitutions tried when the original token misses the dictionary
const OCR_SUBSTITUTIONS: &[(&str, &str)] = &[("rn", "m"), ("vv", "w"), ("1l", "ll"), ("0o", "oo")];

pub struct TextEnhancer {
    mode: EnhanceMode,
}

impl TextEnhancer {
    pub fn new(mode: EnhanceMode) -> Self {
        Self { mode }
    }

    /// Enhance one text; `Off` only records the score passthrough
    pub fn enhance(&self, raw: &str) -> Enhanced {
        if self.mode == EnhanceMode::Off {
            return Enhanced {
                text: raw.to_string(),
                corrections: BTreeMap::new(),
            };
        }

        let mut corrections: BTreeMap<String, usize> = BTreeMap::new();
        let normalized = normalize_whitespace(raw);

        let mut out_paragraphs = Vec::new();
        for paragraph in normalized.split("\n\n") {
            let mut out_lines = Vec::new();
            for line in paragraph.lines() {
                let mut tokens = Vec::new();
                for token in line.split(' ') {
                    tokens.extend(self.fix_token(token, &mut corrections));
                }
                out_lines.push(tokens.join(" "));
            }
            out_paragraphs.push(out_lines.join("\n"));
        }

        Enhanced {
            text: out_paragraphs.join("\n\n"),
            corrections,
        }
    }

    /// Apply the token-level passes in order; a token may split in two
    fn fix_token(&self, token: &str, corrections: &mut BTreeMap<String, usize>) -> Vec<String> {
        let dict = dictionary();
        if token.is_empty() || dict.contains(token) && !has_digit_boundary(token) {
            return vec![token.to_string()];
        }

        // Digit-boundary split: "Level1" -> "Level 1"
        if let Some((left, right)) = split_digit_boundary(token) {
            if dict.contains(&left) {
                bump(corrections, "missing_space");
                return vec![left, right];
            }
        }

        if dict.contains(token) {
            return vec![token.to_string()];
        }

        // Run-on splits: lowercase|uppercase boundary first, then any
        // letter boundary where both halves are dictionary words and the
        // joined form is not.
        if let Some((left, right)) = split_run_on(token) {
            bump(corrections, "run_on");
            return vec![left, right];
        }

        // OCR substitutions, gated on the replacement gaining a hit
        for (from, to) in OCR_SUBSTITUTIONS {
            if token.to_lowercase().contains(from) {
                let candidate = replace_preserving_case(token, from, to);
                if dict.contains(&candidate) {
                    bump(corrections, "ocr_sub");
                    return vec![candidate];
                }
            }
        }

        // Spell correction
        if !dict.is_protected(token) && self.correctable(token) {
            let max_distance = match self.mode {
                EnhanceMode::Aggressive => 3,
                _ => 2,
            };
            if let Some(fix) = dict.suggest(token, max_distance) {
                bump(corrections, "spelling");
                return vec![carry_case_and_punct(token, fix)];
            }
        }

        vec![token.to_string()]
    }

    /// Normal mode leaves proper-noun-looking tokens alone
    fn correctable(&self, token: &str) -> bool {
        match self.mode {
            EnhanceMode::Aggressive => true,
            _ => !looks_proper_noun(token),
        }
    }
}

/// Collapse space runs, normalize line endings, strip trailing spaces,
/// preserve paragraph breaks (two or more newlines collapse to exactly two)
pub fn normalize_whitespace(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut paragraphs = Vec::new();
    for paragraph in split_paragraphs(&unified) {
        let lines: Vec<String> = paragraph
            .lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|l| !l.is_empty())
            .collect();
        if !lines.is_empty() {
            paragraphs.push(lines.join("\n"));
        }
    }
    paragraphs.join("\n\n")
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i;
            while j < bytes.len() && bytes[j] == b'\n' {
                j += 1;
            }
            if j - i >= 2 {
                out.push(&text[start..i]);
                start = j;
            }
            i = j;
        } else {
            i += 1;
        }
    }
    out.push(&text[start..]);
    out
}

fn bump(map: &mut BTreeMap<String, usize>, kind: &str) {
    *map.entry(kind.to_string()).or_default() += 1;
}

fn has_digit_boundary(token: &str) -> bool {
    let chars: Vec<char> = token.chars().collect();
    chars
        .windows(2)
        .any(|w| w[0].is_alphabetic() && w[1].is_ascii_digit())
}

/// "Level1" -> ("Level", "1"); only letter-then-digit boundaries
fn split_digit_boundary(token: &str) -> Option<(String, String)> {
    let chars: Vec<char> = token.chars().collect();
    for i in 1..chars.len() {
        if chars[i - 1].is_alphabetic() && chars[i].is_ascii_digit() {
            let left: String = chars[..i].iter().collect();
            let right: String = chars[i..].iter().collect();
            return Some((left, right));
        }
    }
    None
}

/// Split a joined pair when both halves are dictionary words and the
/// joined form is not. Case boundaries are preferred split points.
fn split_run_on(token: &str) -> Option<(String, String)> {
    let dict = dictionary();
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 4 {
        return None;
    }
    // Preferred: lowercase followed by uppercase
    for i in 1..chars.len() {
        if chars[i - 1].is_lowercase() && chars[i].is_uppercase() {
            let left: String = chars[..i].iter().collect();
            let right: String = chars[i..].iter().collect();
            if dict.contains(&left) && dict.contains(&right) {
                return Some((left, right));
            }
        }
    }
    // Fallback: any split where both halves are words, longest left wins
    for i in (2..chars.len() - 1).rev() {
        let left: String = chars[..i].iter().collect();
        let right: String = chars[i..].iter().collect();
        if dict.contains(&left) && dict.contains(&right) {
            return Some((left, right));
        }
    }
    None
}

fn replace_preserving_case(token: &str, from: &str, to: &str) -> String {
    token.to_lowercase().replacen(from, to, 1)
}

/// Re-apply leading capitalization and trailing punctuation of the
/// original token to a lowercase dictionary suggestion
fn carry_case_and_punct(original: &str, fix: &str) -> String {
    let trailing: String = original
        .chars()
        .rev()
        .take_while(|c| !c.is_alphanumeric())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let capitalize = original.chars().next().is_some_and(|c| c.is_uppercase());
    let mut word = fix.to_string();
    if capitalize {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            word = first.to_uppercase().collect::<String>() + chars.as_str();
        }
    }
    word + &trailing
}

fn looks_proper_noun(token: &str) -> bool {
    let mut chars = token.chars().filter(|c| c.is_alphabetic());
    match chars.next() {
        Some(first) if first.is_uppercase() => chars.all(|c| c.is_lowercase()),
        _ => false,
    }
}

/// Quality score 0-100 for a text
///
/// Weighted blend: dictionary coverage (0.5), word volume (0.2),
/// structural markers (0.2), 1 - suspicious-pattern rate (0.1).
pub fn quality_score(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }
    let dict = dictionary();
    let coverage = dict.coverage(text);

    let words = text.split_whitespace().count();
    let volume = (words as f64 / 10.0).min(1.0);

    let has_paragraphs = text.contains("\n\n");
    let has_headings = text
        .lines()
        .any(|l| !l.is_empty() && l.split_whitespace().count() <= 6 && l == l.to_uppercase());
    let structure = match (has_paragraphs, has_headings) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.6,
        (false, false) => 0.2,
    };

    let suspicious = text
        .split_whitespace()
        .filter(|t| is_suspicious(t))
        .count();
    let suspicious_rate = if words == 0 {
        0.0
    } else {
        suspicious as f64 / words as f64
    };

    100.0 * (0.5 * coverage + 0.2 * volume + 0.2 * structure + 0.1 * (1.0 - suspicious_rate))
}

/// Letter grade at the 90/80/70/60 thresholds
pub fn grade(score: f64) -> char {
    match score {
        s if s >= 90.0 => 'A',
        s if s >= 80.0 => 'B',
        s if s >= 70.0 => 'C',
        s if s >= 60.0 => 'D',
        _ => 'F',
    }
}

fn is_suspicious(token: &str) -> bool {
    let has_inner_digit = {
        let chars: Vec<char> = token.chars().collect();
        chars.windows(3).any(|w| {
            w[0].is_alphabetic() && w[1].is_ascii_digit() && w[2].is_alphabetic()
        })
    };
    let repeated_punct = token
        .chars()
        .collect::<Vec<_>>()
        .windows(2)
        .any(|w| !w[0].is_alphanumeric() && w[0] == w[1]);
    has_inner_digit || repeated_punct
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_is_a_fixed_point() {
        let enhancer = TextEnhancer::new(EnhanceMode::Normal);
        let clean = "The character makes a saving throw.\n\nCombat begins on the next round.";
        let once = enhancer.enhance(clean);
        assert_eq!(once.text, clean);
        assert!(once.corrections.is_empty());
        let twice = enhancer.enhance(&once.text);
        assert_eq!(twice.text, once.text);
    }

    #[test]
    fn run_on_words_are_split() {
        let enhancer = TextEnhancer::new(EnhanceMode::Normal);
        let out = enhancer.enhance("Saving throwsare used to avoid harmful effects");
        assert!(out.text.contains("throws are"), "got: {}", out.text);
        assert_eq!(out.corrections["run_on"], 1);
    }

    #[test]
    fn digit_boundary_gains_a_space() {
        let enhancer = TextEnhancer::new(EnhanceMode::Normal);
        let out = enhancer.enhance("Advance to Level1 after the battle");
        assert!(out.text.contains("Level 1"), "got: {}", out.text);
        assert_eq!(out.corrections["missing_space"], 1);
    }

    #[test]
    fn whitespace_is_normalized_but_paragraphs_survive() {
        let out = normalize_whitespace("one  two   three\r\n\r\n\r\nnext  paragraph  ");
        assert_eq!(out, "one two three\n\nnext paragraph");
    }

    #[test]
    fn spelling_is_corrected_within_distance_two() {
        let enhancer = TextEnhancer::new(EnhanceMode::Normal);
        let out = enhancer.enhance("the charcter rolls initiative");
        assert!(out.text.contains("character"), "got: {}", out.text);
        assert_eq!(out.corrections["spelling"], 1);
    }

    #[test]
    fn protected_jargon_is_untouched() {
        let enhancer = TextEnhancer::new(EnhanceMode::Aggressive);
        let out = enhancer.enhance("the drow tiefling uses THAC0");
        assert!(out.text.contains("drow"));
        assert!(out.text.contains("tiefling"));
        assert!(out.corrections.is_empty(), "got: {:?}", out.corrections);
    }

    #[test]
    fn normal_mode_spares_proper_nouns() {
        let enhancer = TextEnhancer::new(EnhanceMode::Normal);
        let out = enhancer.enhance("Tenser floats the disc");
        assert!(out.text.contains("Tenser"), "got: {}", out.text);
    }

    #[test]
    fn off_mode_is_a_passthrough() {
        let enhancer = TextEnhancer::new(EnhanceMode::Off);
        let messy = "Saving  throwsare   used";
        assert_eq!(enhancer.enhance(messy).text, messy);
    }

    #[test]
    fn grades_follow_thresholds() {
        assert_eq!(grade(95.0), 'A');
        assert_eq!(grade(90.0), 'A');
        assert_eq!(grade(85.0), 'B');
        assert_eq!(grade(72.5), 'C');
        assert_eq!(grade(61.0), 'D');
        assert_eq!(grade(30.0), 'F');
    }

    #[test]
    fn quality_rewards_clean_structured_text() {
        let clean = "COMBAT\n\nThe character makes a saving throw against the attack. \
                     Damage is rolled on the table and applied to the target.";
        let garbage = "zzqx!! vlorp##  a9b w1r7 xx";
        assert!(quality_score(clean) > quality_score(garbage));
        assert!(quality_score(clean) >= 80.0);
    }
}

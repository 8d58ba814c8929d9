//! Prompt construction shared by the HTTP providers
//!
//! The wording is deliberately minimal; only the structured output
//! contract matters. Every prompt demands a single JSON value and the
//! callers reject anything that fails to parse.

use super::{CharacterPassKind, CharacterSketch};
use crate::models::ContentKind;

/// Ceiling on section text handed to categorization
const CATEGORIZE_CHAR_CEILING: usize = 2_000;

pub(super) fn identify(text: &str, kind_hint: ContentKind) -> String {
    format!(
        "You classify tabletop RPG books. The document below is {} content.\n\
         Reply with exactly one JSON object, no other text, with fields:\n\
         {{\"kind\": \"source_material\"|\"novel\", \"game\": string, \"edition\": string, \
         \"book\": string, \"book_title\": string, \"publisher\": string|null, \
         \"confidence\": number in [0,1], \"rationale\": string}}\n\n\
         DOCUMENT SAMPLE:\n{}",
        kind_hint.as_str(),
        text
    )
}

pub(super) fn categorize(section_text: &str, allowed: &[&str]) -> String {
    let clipped = clip(section_text, CATEGORIZE_CHAR_CEILING);
    format!(
        "Categorize this content. Allowed categories: {}.\n\
         Reply with exactly one JSON object, no other text:\n\
         {{\"category\": string (one of the allowed), \"confidence\": number in [0,1], \
         \"rationale\": string}}\n\nCONTENT:\n{}",
        allowed.join(", "),
        clipped
    )
}

pub(super) fn characters(
    text: &str,
    pass: CharacterPassKind,
    prior: Option<&[CharacterSketch]>,
) -> String {
    let task = match pass {
        CharacterPassKind::Discover => {
            "List the named characters appearing in this novel excerpt.".to_string()
        }
        CharacterPassKind::Enhance => {
            let names: Vec<&str> = prior
                .unwrap_or(&[])
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            format!(
                "For these known characters: {} — collect relationships, verbatim quotes \
                 with page numbers, and personality/behavior tags from the excerpt.",
                names.join(", ")
            )
        }
    };
    format!(
        "{task}\nReply with exactly one JSON array, no other text; each element:\n\
         {{\"name\": string, \"aliases\": [string], \"pages\": [number], \
         \"personality\": [string], \"behaviors\": [string], \
         \"quotes\": [{{\"text\": string, \"page\": number}}], \
         \"relationships\": [string]}}\n\nEXCERPT:\n{text}"
    )
}

fn clip(text: &str, max: usize) -> &str {
    let mut end = max.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

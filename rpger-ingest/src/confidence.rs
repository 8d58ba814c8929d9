//! Extraction confidence scoring
//!
//! Combines text, layout, OCR, and table sub-scores into an overall
//! grade for the completed extraction.

use serde::{Deserialize, Serialize};

use crate::enhance::{dictionary, grade};
use crate::models::{QualityMetrics, Section};

const TEXT_WEIGHT: f64 = 0.4;
const LAYOUT_WEIGHT: f64 = 0.3;
const OCR_WEIGHT: f64 = 0.2;
const TABLE_WEIGHT: f64 = 0.1;

/// Confidence record attached to every artifact; sub-scores in [0,100]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub text_confidence: f64,
    pub layout_confidence: f64,
    pub ocr_confidence: f64,
    pub table_confidence: f64,
    pub overall: f64,
    pub grade: char,
}

/// Score a completed extraction
///
/// `total_pages` is the document's page count; pages that produced no
/// section count against the extraction success rate.
pub fn assess(sections: &[Section], quality: &QualityMetrics, total_pages: usize) -> ConfidenceReport {
    let text_confidence = text_score(sections, total_pages);
    let layout_confidence = layout_score(sections);
    let ocr_confidence = ocr_score(sections);
    let table_confidence = table_score(sections);

    let overall = TEXT_WEIGHT * text_confidence
        + LAYOUT_WEIGHT * layout_confidence
        + OCR_WEIGHT * ocr_confidence
        + TABLE_WEIGHT * table_confidence;

    let report = ConfidenceReport {
        text_confidence,
        layout_confidence,
        ocr_confidence,
        table_confidence,
        overall,
        grade: grade(overall),
    };

    tracing::debug!(
        text = report.text_confidence,
        layout = report.layout_confidence,
        ocr = report.ocr_confidence,
        tables = report.table_confidence,
        overall = report.overall,
        grade = %report.grade,
        pages_failed = quality.pages_failed,
        "Confidence assessed"
    );

    report
}

/// Dictionary coverage blended with the extraction success rate
fn text_score(sections: &[Section], total_pages: usize) -> f64 {
    if sections.is_empty() {
        return 0.0;
    }
    let dict = dictionary();
    let coverage: f64 = sections
        .iter()
        .map(|s| dict.coverage(&s.enhanced_text))
        .sum::<f64>()
        / sections.len() as f64;

    let extracted_pages = sections
        .iter()
        .map(|s| s.page)
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    let success_rate = if total_pages == 0 {
        0.0
    } else {
        (extracted_pages as f64 / total_pages as f64).min(1.0)
    };

    100.0 * (0.6 * coverage + 0.4 * success_rate)
}

/// Heading and paragraph density over the enhanced text
fn layout_score(sections: &[Section]) -> f64 {
    if sections.is_empty() {
        return 0.0;
    }
    let structured = sections
        .iter()
        .filter(|s| {
            let text = &s.enhanced_text;
            text.contains("\n\n")
                || text.lines().any(|l| {
                    !l.is_empty() && l.split_whitespace().count() <= 6 && l == l.to_uppercase()
                })
        })
        .count();
    100.0 * structured as f64 / sections.len() as f64
}

/// Mean of per-page OCR scores for pages where OCR was used; 100 otherwise
fn ocr_score(sections: &[Section]) -> f64 {
    let ocr: Vec<f64> = sections
        .iter()
        .filter(|s| s.ocr_used)
        .map(|s| s.ocr_confidence.unwrap_or(0.0))
        .collect();
    if ocr.is_empty() {
        100.0
    } else {
        100.0 * ocr.iter().sum::<f64>() / ocr.len() as f64
    }
}

/// Fraction of detected tables passing the rectangular-shape heuristic
fn table_score(sections: &[Section]) -> f64 {
    let tables: Vec<_> = sections.iter().flat_map(|s| &s.tables).collect();
    if tables.is_empty() {
        return 100.0;
    }
    let rectangular = tables.iter().filter(|t| t.is_rectangular()).count();
    100.0 * rectangular as f64 / tables.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Table;

    fn section(page: u32, text: &str) -> Section {
        Section {
            page,
            ordinal: 0,
            title: String::new(),
            raw_text: text.to_string(),
            enhanced_text: text.to_string(),
            category: "Rules".into(),
            category_confidence: 0.8,
            has_tables: false,
            tables: Vec::new(),
            word_count: text.split_whitespace().count(),
            ocr_used: false,
            ocr_confidence: None,
        }
    }

    #[test]
    fn clean_extraction_grades_b_or_better() {
        let text = "COMBAT\n\nThe character makes a saving throw against the attack. \
                    Damage is rolled on the table and applied to the target.";
        let sections: Vec<Section> = (1..=4).map(|p| section(p, text)).collect();
        let report = assess(&sections, &QualityMetrics::default(), 4);
        assert!(report.overall >= 80.0, "overall {}", report.overall);
        assert!(matches!(report.grade, 'A' | 'B'));
    }

    #[test]
    fn ocr_pages_pull_the_score_down() {
        let mut good = section(1, "the character makes a saving throw");
        good.ocr_used = true;
        good.ocr_confidence = Some(0.5);
        let report = assess(&[good], &QualityMetrics::default(), 1);
        assert!((report.ocr_confidence - 50.0).abs() < 1e-9);
    }

    #[test]
    fn native_text_scores_full_ocr_confidence() {
        let report = assess(
            &[section(1, "the character makes a saving throw")],
            &QualityMetrics::default(),
            1,
        );
        assert_eq!(report.ocr_confidence, 100.0);
    }

    #[test]
    fn ragged_tables_lower_table_confidence() {
        let mut s = section(1, "tables ahead");
        s.tables.push(Table {
            id: "page_1_table_1".into(),
            page: 1,
            ordinal: 0,
            headers: vec!["a".into(), "b".into()],
            rows: vec![vec!["1".into(), "2".into()]],
        });
        s.tables.push(Table {
            id: "page_1_table_2".into(),
            page: 1,
            ordinal: 1,
            headers: vec!["a".into(), "b".into()],
            rows: vec![vec!["1".into()]],
        });
        let report = assess(&[s], &QualityMetrics::default(), 1);
        assert!((report.table_confidence - 50.0).abs() < 1e-9);
    }

    #[test]
    fn missing_pages_reduce_text_confidence() {
        let text = "the character makes a saving throw";
        let full = assess(&[section(1, text), section(2, text)], &QualityMetrics::default(), 2);
        let partial = assess(&[section(1, text)], &QualityMetrics::default(), 2);
        assert!(partial.text_confidence < full.text_confidence);
    }
}

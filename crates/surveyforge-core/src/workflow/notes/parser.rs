//! Parsers for the structured text the note stage asks the model to emit.
//!
//! Section extraction expects six `LABEL:` blocks; insight extraction
//! expects numbered `INSIGHT_N:` blocks with `CONTENT:`, `IMPORTANCE:`,
//! `TYPE:`, and `CONFIDENCE:` fields. Both parsers are total: anything
//! unparseable is dropped, never an error.

use regex::Regex;

use crate::model::NoteKind;

/// Minimum trimmed length for an insight to be kept.
const MIN_INSIGHT_CHARS: usize = 10;

/// Maximum insights kept per paper.
const MAX_INSIGHTS: usize = 7;

/// Section labels in response order, paired with their note kinds.
const SECTION_LABELS: [(&str, NoteKind); 6] = [
    ("ABSTRACT", NoteKind::Abstract),
    ("INTRODUCTION", NoteKind::Introduction),
    ("METHODOLOGY", NoteKind::Methodology),
    ("FINDINGS", NoteKind::Findings),
    ("LIMITATIONS", NoteKind::Limitations),
    ("FUTURE_WORK", NoteKind::FutureWork),
];

/// A single parsed insight.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInsight {
    pub content: String,
    pub kind: NoteKind,
    pub confidence: f64,
}

fn field_pattern(label: &str) -> Regex {
    // Content runs to the next ALL_CAPS label or end of input.
    Regex::new(&format!(r"(?is){label}:\s*(.+?)(?=\n\s*[A-Z_]+:|\z)")).expect("static pattern")
}

/// Extract labeled sections, dropping absent and "Not available" entries.
///
/// Returns sections in the fixed label order regardless of response order.
pub fn parse_sections(response: &str) -> Vec<(NoteKind, String)> {
    let mut sections = Vec::new();
    for (label, kind) in SECTION_LABELS {
        let Some(captures) = field_pattern(label).captures(response) else {
            continue;
        };
        let content = captures[1].trim().to_string();
        if content.is_empty() || content.eq_ignore_ascii_case("not available") {
            continue;
        }
        sections.push((kind, content));
    }
    sections
}

/// Extract numbered insights, keeping at most [`MAX_INSIGHTS`].
pub fn parse_insights(response: &str) -> Vec<ParsedInsight> {
    let block_pattern =
        Regex::new(r"(?is)INSIGHT_\d+:\s*(.*?)(?=INSIGHT_\d+:|\z)").expect("static pattern");

    let mut insights = Vec::new();
    for captures in block_pattern.captures_iter(response) {
        let block = &captures[1];

        let Some(content) = extract_field(block, "CONTENT") else {
            continue;
        };
        if content.chars().count() < MIN_INSIGHT_CHARS {
            continue;
        }

        let kind = extract_field(block, "TYPE")
            .and_then(|t| NoteKind::parse(&t))
            .filter(is_insight_kind)
            .unwrap_or(NoteKind::KeyFinding);

        let confidence = extract_field(block, "CONFIDENCE")
            .and_then(|c| leading_float(&c))
            .unwrap_or(0.7)
            .clamp(0.1, 0.9);

        insights.push(ParsedInsight {
            content,
            kind,
            confidence,
        });
        if insights.len() == MAX_INSIGHTS {
            break;
        }
    }
    insights
}

fn is_insight_kind(kind: &NoteKind) -> bool {
    matches!(
        kind,
        NoteKind::KeyFinding | NoteKind::Methodology | NoteKind::Limitations | NoteKind::FutureWork
    )
}

fn extract_field(block: &str, label: &str) -> Option<String> {
    let captures = field_pattern(label).captures(block)?;
    let value = captures[1].trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Parse a float from the start of a field value ("0.8", "0.8 (high)").
fn leading_float(value: &str) -> Option<f64> {
    let token: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTIONS_RESPONSE: &str = "\
ABSTRACT: The paper studies transformer pruning at scale.
INTRODUCTION: Not available
METHODOLOGY: Structured magnitude pruning with retraining.
FINDINGS: 60% sparsity retains accuracy within 0.5%.
LIMITATIONS: Not available
FUTURE_WORK: Extend to multimodal encoders.";

    #[test]
    fn sections_parse_and_drop_not_available() {
        let sections = parse_sections(SECTIONS_RESPONSE);
        let kinds: Vec<NoteKind> = sections.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                NoteKind::Abstract,
                NoteKind::Methodology,
                NoteKind::Findings,
                NoteKind::FutureWork,
            ]
        );
        assert_eq!(
            sections[0].1,
            "The paper studies transformer pruning at scale."
        );
    }

    #[test]
    fn sections_tolerate_multiline_content() {
        let response = "ABSTRACT: First line\ncontinues here.\nMETHODOLOGY: Second section.";
        let sections = parse_sections(response);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].1, "First line\ncontinues here.");
    }

    #[test]
    fn sections_empty_response_yields_nothing() {
        assert!(parse_sections("").is_empty());
        assert!(parse_sections("no labels anywhere in this text").is_empty());
    }

    #[test]
    fn sections_case_insensitive_not_available() {
        let response = "ABSTRACT: NOT AVAILABLE\nFINDINGS: A real finding here.";
        let sections = parse_sections(response);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].0, NoteKind::Findings);
    }

    const INSIGHTS_RESPONSE: &str = "\
INSIGHT_1:
CONTENT: Pruning preserves attention head diversity.
IMPORTANCE: Explains retained accuracy.
TYPE: key_finding
CONFIDENCE: 0.85

INSIGHT_2:
CONTENT: Retraining schedule matters more than mask choice.
IMPORTANCE: Practical guidance.
TYPE: methodology
CONFIDENCE: 0.7

INSIGHT_3:
CONTENT: Too short
TYPE: key_finding
CONFIDENCE: 0.9";

    #[test]
    fn insights_parse_fields() {
        let insights = parse_insights(INSIGHTS_RESPONSE);
        assert_eq!(insights.len(), 2, "short insight dropped");
        assert_eq!(
            insights[0].content,
            "Pruning preserves attention head diversity."
        );
        assert_eq!(insights[0].kind, NoteKind::KeyFinding);
        assert!((insights[0].confidence - 0.85).abs() < 1e-9);
        assert_eq!(insights[1].kind, NoteKind::Methodology);
    }

    #[test]
    fn insight_unknown_type_defaults_to_key_finding() {
        let response = "INSIGHT_1:\nCONTENT: A sufficiently long insight.\nTYPE: speculation\nCONFIDENCE: 0.8";
        let insights = parse_insights(response);
        assert_eq!(insights[0].kind, NoteKind::KeyFinding);
    }

    #[test]
    fn insight_section_kinds_are_rejected_as_types() {
        // "abstract" is a valid NoteKind but not a valid insight TYPE.
        let response = "INSIGHT_1:\nCONTENT: A sufficiently long insight.\nTYPE: abstract\nCONFIDENCE: 0.8";
        let insights = parse_insights(response);
        assert_eq!(insights[0].kind, NoteKind::KeyFinding);
    }

    #[test]
    fn insight_confidence_clamped_and_defaulted() {
        let response = "INSIGHT_1:\nCONTENT: A sufficiently long insight.\nTYPE: key_finding\nCONFIDENCE: 1.5";
        assert!((parse_insights(response)[0].confidence - 0.9).abs() < 1e-9);

        let response = "INSIGHT_1:\nCONTENT: A sufficiently long insight.\nTYPE: key_finding";
        assert!((parse_insights(response)[0].confidence - 0.7).abs() < 1e-9);

        let response =
            "INSIGHT_1:\nCONTENT: A sufficiently long insight.\nCONFIDENCE: not a number";
        assert!((parse_insights(response)[0].confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn insights_capped_at_seven() {
        let mut response = String::new();
        for i in 1..=10 {
            response.push_str(&format!(
                "INSIGHT_{i}:\nCONTENT: Numbered insight content {i}.\nTYPE: key_finding\nCONFIDENCE: 0.8\n\n"
            ));
        }
        assert_eq!(parse_insights(&response).len(), 7);
    }

    #[test]
    fn insights_without_content_dropped() {
        let response = "INSIGHT_1:\nIMPORTANCE: why\nTYPE: key_finding\nCONFIDENCE: 0.8";
        assert!(parse_insights(response).is_empty());
    }

    #[test]
    fn leading_float_tolerates_suffixes() {
        assert_eq!(leading_float("0.8 (high)"), Some(0.8));
        assert_eq!(leading_float("0.65"), Some(0.65));
        assert_eq!(leading_float("high"), None);
    }
}

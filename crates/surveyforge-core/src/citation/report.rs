//! Citation quality scoring and the collection-level report.
//!
//! Each citation is scored out of 100 with fixed per-field deductions; the
//! report aggregates issue frequencies across the collection and renders a
//! human-readable summary.

use std::collections::BTreeMap;

use serde::Serialize;

use super::doi_pattern;
use crate::model::{Citation, Paper};

/// Categorical quality label derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    Excellent,
    Good,
    Acceptable,
    Poor,
    VeryPoor,
}

impl QualityLabel {
    fn from_score(score: u32) -> Self {
        match score {
            90..=100 => QualityLabel::Excellent,
            75..=89 => QualityLabel::Good,
            60..=74 => QualityLabel::Acceptable,
            40..=59 => QualityLabel::Poor,
            _ => QualityLabel::VeryPoor,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            QualityLabel::Excellent => "excellent",
            QualityLabel::Good => "good",
            QualityLabel::Acceptable => "acceptable",
            QualityLabel::Poor => "poor",
            QualityLabel::VeryPoor => "very_poor",
        }
    }
}

/// Quality assessment for a single citation.
#[derive(Debug, Clone, Serialize)]
pub struct CitationQuality {
    /// The citation key being assessed.
    pub citation_key: String,
    /// Score out of 100 after deductions.
    pub score: u32,
    /// Categorical label for the score.
    pub label: QualityLabel,
    /// Issues found, as stable identifiers (e.g. `missing_doi`).
    pub issues: Vec<String>,
}

/// Collection-level quality report.
#[derive(Debug, Clone, Serialize)]
pub struct CitationReport {
    /// Number of citations assessed.
    pub total: usize,
    /// Mean score across the collection.
    pub average_score: f64,
    /// How many citations exhibit each issue.
    pub issue_counts: BTreeMap<String, usize>,
    /// Per-citation assessments, in input order.
    pub entries: Vec<CitationQuality>,
}

/// Score one citation against its paper's metadata.
pub fn assess_citation(citation: &Citation, paper: &Paper) -> CitationQuality {
    let mut score: i32 = 100;
    let mut issues = Vec::new();

    let mut deduct = |amount: i32, issue: &str, issues: &mut Vec<String>| {
        score -= amount;
        issues.push(issue.to_string());
    };

    if paper.title.trim().is_empty() {
        deduct(30, "missing_title", &mut issues);
    }
    if paper.authors.is_empty() {
        deduct(25, "missing_authors", &mut issues);
    }
    if paper.published_date.is_none() {
        deduct(15, "missing_date", &mut issues);
    }
    if paper.venue.as_deref().map_or(true, |v| v.trim().is_empty()) {
        deduct(10, "missing_venue", &mut issues);
    }
    match paper.doi.as_deref().map(str::trim) {
        None | Some("") => deduct(5, "missing_doi", &mut issues),
        Some(doi) if !doi_pattern().is_match(doi) => deduct(10, "invalid_doi", &mut issues),
        Some(_) => {}
    }
    let url_ok = paper.url.starts_with("http://") || paper.url.starts_with("https://");
    if !url_ok {
        deduct(5, "bad_url", &mut issues);
    }

    let score = score.max(0) as u32;
    CitationQuality {
        citation_key: citation.citation_key.clone(),
        score,
        label: QualityLabel::from_score(score),
        issues,
    }
}

/// Assess every citation in a run and aggregate issue frequencies.
///
/// Citations whose paper is missing from `papers` are skipped (they cannot
/// be scored without metadata).
pub fn generate_report(citations: &[Citation], papers: &[Paper]) -> CitationReport {
    let mut entries = Vec::with_capacity(citations.len());
    let mut issue_counts: BTreeMap<String, usize> = BTreeMap::new();

    for citation in citations {
        let Some(paper) = papers.iter().find(|p| p.id == citation.paper_id) else {
            tracing::warn!(
                citation_key = %citation.citation_key,
                paper_id = %citation.paper_id,
                "citation references unknown paper, skipping assessment",
            );
            continue;
        };
        let quality = assess_citation(citation, paper);
        for issue in &quality.issues {
            *issue_counts.entry(issue.clone()).or_insert(0) += 1;
        }
        entries.push(quality);
    }

    let average_score = if entries.is_empty() {
        0.0
    } else {
        entries.iter().map(|e| f64::from(e.score)).sum::<f64>() / entries.len() as f64
    };

    CitationReport {
        total: entries.len(),
        average_score,
        issue_counts,
        entries,
    }
}

impl CitationReport {
    /// Render the report as the plain-text summary returned in workflow results.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("Citation Quality Report\n");
        out.push_str("=======================\n\n");
        out.push_str(&format!("Total Citations: {}\n", self.total));
        out.push_str(&format!("Average Score: {:.1}/100\n\n", self.average_score));

        if self.issue_counts.is_empty() {
            out.push_str("No issues found.\n");
        } else {
            out.push_str("Issues Found:\n");
            for (issue, count) in &self.issue_counts {
                out.push_str(&format!("- {issue}: {count}\n"));
            }
        }

        out.push('\n');
        for entry in &self.entries {
            out.push_str(&format!(
                "{}: {}/100 ({})\n",
                entry.citation_key,
                entry.score,
                entry.label.as_str()
            ));
        }
        out
    }
}

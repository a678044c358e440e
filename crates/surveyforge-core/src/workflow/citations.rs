//! Citation stage: key generation, CrossRef enrichment, formatting, and
//! the inline-citation post-pass.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::citation::report::{generate_report, CitationReport};
use crate::citation::{create_bibliography, CitationFormatter};
use crate::model::{Citation, Paper};
use crate::source::SourceAdapter;
use crate::storage::ResearchStore;

use super::WorkflowError;

/// Execute the citation stage over the run's papers.
///
/// Enrichment through the DOI-lookup adapter is best-effort: a failing
/// lookup never fails the stage, it just formats from the original record.
pub async fn execute(
    doi_lookup: Option<&dyn SourceAdapter>,
    store: Option<&dyn ResearchStore>,
    cancel: &CancellationToken,
    papers: &[Paper],
) -> Result<Vec<Citation>, WorkflowError> {
    let mut formatter = CitationFormatter::new();
    let mut citations = Vec::with_capacity(papers.len());

    for paper in papers {
        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let enriched = match (doi_lookup, paper.doi.as_deref().filter(|d| !d.is_empty())) {
            (Some(adapter), Some(doi)) => match adapter.get_by_doi(doi).await {
                Ok(Some(record)) => Some(merge_enrichment(paper, &record)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(paper_id = %paper.id, error = %e, "citation enrichment failed");
                    None
                }
            },
            _ => None,
        };

        let citation = formatter.create_citation(enriched.as_ref().unwrap_or(paper));
        if let Some(store) = store {
            if let Err(e) = store.save_citation(&citation).await {
                tracing::warn!(citation_key = %citation.citation_key, error = %e, "citation persistence failed");
            }
        }
        citations.push(citation);
    }

    tracing::info!(citations = citations.len(), "citation generation complete");
    Ok(citations)
}

/// Merge a DOI-lookup record into the original paper.
///
/// The lookup wins only where it is strictly more complete: longer title,
/// longer abstract, larger author list, a venue when the original has
/// none. Identity fields (id, url, citations, arXiv id) stay original.
pub fn merge_enrichment(original: &Paper, lookup: &Paper) -> Paper {
    let mut merged = original.clone();

    if lookup.title.len() > original.title.len() {
        merged.title = lookup.title.clone();
    }
    if lookup.abstract_text.len() > original.abstract_text.len() {
        merged.abstract_text = lookup.abstract_text.clone();
    }
    if lookup.authors.len() > original.authors.len() {
        merged.authors = lookup.authors.clone();
    }
    if original.venue.as_deref().map_or(true, str::is_empty) {
        merged.venue = lookup.venue.clone();
    }
    if original.published_date.is_none() {
        merged.published_date = lookup.published_date;
    }
    if original.doi.as_deref().map_or(true, str::is_empty) {
        merged.doi = lookup.doi.clone();
    }

    merged
}

/// Resolve `[Citation]` placeholders in a drafted section.
///
/// Each placeholder is matched against paper titles using the tokens of
/// its surrounding sentence; the best-overlapping paper's citation key is
/// substituted as `[key]`. Placeholders with no token overlap are left in
/// place.
pub fn insert_inline_citations(text: &str, citations: &[Citation], papers: &[Paper]) -> String {
    const PLACEHOLDER: &str = "[Citation]";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(PLACEHOLDER) {
        let (before, after) = rest.split_at(pos);
        let sentence = surrounding_sentence(before, &after[PLACEHOLDER.len()..]);

        match best_citation_key(&sentence, citations, papers) {
            Some(key) => {
                out.push_str(before);
                out.push_str(&format!("[{key}]"));
            }
            None => {
                out.push_str(before);
                out.push_str(PLACEHOLDER);
            }
        }
        rest = &after[PLACEHOLDER.len()..];
    }
    out.push_str(rest);
    out
}

/// The sentence fragment around a placeholder: text back to the previous
/// sentence break plus text forward to the next one.
fn surrounding_sentence(before: &str, after: &str) -> String {
    let start = before
        .rfind(['.', '!', '?'])
        .map_or(0, |i| i + 1);
    let end = after.find(['.', '!', '?']).unwrap_or(after.len());
    format!("{} {}", &before[start..], &after[..end])
}

fn best_citation_key(
    sentence: &str,
    citations: &[Citation],
    papers: &[Paper],
) -> Option<String> {
    let sentence_tokens = tokenize(sentence);
    if sentence_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(usize, &Citation)> = None;
    for citation in citations {
        let Some(paper) = papers.iter().find(|p| p.id == citation.paper_id) else {
            continue;
        };
        let overlap = tokenize(&paper.title)
            .intersection(&sentence_tokens)
            .count();
        if overlap > 0 && best.map_or(true, |(best_overlap, _)| overlap > best_overlap) {
            best = Some((overlap, citation));
        }
    }

    best.map(|(_, citation)| citation.citation_key.clone())
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .map(str::to_string)
        .collect()
}

/// Assemble the bibliography and quality report for a completed run.
pub fn assemble_outputs(
    citations: &[Citation],
    papers: &[Paper],
) -> (String, CitationReport) {
    let bibliography = create_bibliography(citations, papers);
    let report = generate_report(citations, papers);
    (bibliography, report)
}

//! Duplicate paper detection and merging.
//!
//! Papers found through multiple sources are collapsed into one record.
//! Two papers are the same iff any of: equal non-empty DOI, equal non-empty
//! arXiv id, or title similarity >= 0.9 combined with a first-author
//! last-name match.

use std::collections::HashSet;

use crate::model::Paper;

/// Title-word Jaccard threshold for the similarity predicate.
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.9;

/// Words ignored when tokenizing titles for similarity.
const TITLE_STOPWORDS: &[&str] = &[
    "about", "after", "against", "along", "among", "approach", "based", "between", "beyond",
    "from", "into", "over", "study", "survey", "that", "their", "these", "this", "through",
    "toward", "towards", "under", "using", "via", "what", "when", "where", "which", "with",
];

/// Deduplicate a merged multi-source result set.
///
/// Order of first occurrence is preserved; later duplicates are merged into
/// the record already kept (the merge may replace the kept record when the
/// newcomer is preferred).
pub fn dedup_papers(papers: Vec<Paper>) -> Vec<Paper> {
    let mut kept: Vec<Paper> = Vec::with_capacity(papers.len());

    for paper in papers {
        match kept.iter().position(|existing| same_paper(existing, &paper)) {
            Some(idx) => {
                let existing = kept[idx].clone();
                kept[idx] = merge_papers(existing, paper);
            }
            None => kept.push(paper),
        }
    }

    kept
}

/// Whether two records describe the same paper.
pub fn same_paper(a: &Paper, b: &Paper) -> bool {
    if let (Some(doi_a), Some(doi_b)) = (normalized_doi(a), normalized_doi(b)) {
        if doi_a == doi_b {
            return true;
        }
    }

    if let (Some(ax_a), Some(ax_b)) = (normalized_arxiv(a), normalized_arxiv(b)) {
        if ax_a == ax_b {
            return true;
        }
    }

    if title_similarity(&a.title, &b.title) >= TITLE_SIMILARITY_THRESHOLD {
        if let (Some(name_a), Some(name_b)) =
            (first_author_last_name(a), first_author_last_name(b))
        {
            if name_a == name_b {
                return true;
            }
        }
    }

    false
}

/// Merge two records known to be the same paper.
///
/// The preferred record wins field-by-field; its missing fields fall back to
/// the other. Preference: non-null DOI, then longer abstract, then higher
/// citation count.
pub fn merge_papers(a: Paper, b: Paper) -> Paper {
    let (mut keep, other) = if prefer_first(&a, &b) { (a, b) } else { (b, a) };

    if keep.doi.as_deref().map_or(true, str::is_empty) {
        keep.doi = other.doi;
    }
    if keep.arxiv_id.as_deref().map_or(true, str::is_empty) {
        keep.arxiv_id = other.arxiv_id;
    }
    if keep.abstract_text.is_empty() {
        keep.abstract_text = other.abstract_text;
    }
    if keep.authors.is_empty() {
        keep.authors = other.authors;
    }
    if keep.venue.as_deref().map_or(true, str::is_empty) {
        keep.venue = other.venue;
    }
    if keep.published_date.is_none() {
        keep.published_date = other.published_date;
    }
    if keep.keywords.is_empty() {
        keep.keywords = other.keywords;
    }
    if keep.full_text.is_none() {
        keep.full_text = other.full_text;
    }
    if keep.url.is_empty() {
        keep.url = other.url;
    }

    keep
}

fn prefer_first(a: &Paper, b: &Paper) -> bool {
    let a_has_doi = normalized_doi(a).is_some();
    let b_has_doi = normalized_doi(b).is_some();
    if a_has_doi != b_has_doi {
        return a_has_doi;
    }

    let a_len = a.abstract_text.len();
    let b_len = b.abstract_text.len();
    if a_len != b_len {
        return a_len > b_len;
    }

    a.citations >= b.citations
}

fn normalized_doi(paper: &Paper) -> Option<String> {
    paper
        .doi
        .as_deref()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
}

fn normalized_arxiv(paper: &Paper) -> Option<String> {
    paper
        .arxiv_id
        .as_deref()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
}

/// Jaccard similarity over lowercased alphabetic title words of length >= 4,
/// stopwords removed.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let set_a = title_tokens(a);
    let set_b = title_tokens(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

fn title_tokens(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| w.len() >= 4 && !TITLE_STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Lowercased alphabetic last name of the first author, if any.
fn first_author_last_name(paper: &Paper) -> Option<String> {
    let first = paper.authors.first()?;
    let last = first.split_whitespace().last()?;
    let cleaned: String = last
        .chars()
        .filter(|c: &char| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

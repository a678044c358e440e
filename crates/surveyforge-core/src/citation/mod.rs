//! Citation formatting: keys, styles, and bibliography assembly.
//!
//! Produces APA, MLA, BibTeX, and Chicago entries for papers, generates
//! collision-free citation keys, and assembles the APA-sorted bibliography.

pub mod report;

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Citation, Paper};

/// The `10.xxxx/...` DOI registrant pattern.
pub fn doi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^10\.\d{4,}/\S+$").expect("static pattern"))
}

/// How a venue publishes, inferred from its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubType {
    Journal,
    Conference,
    Preprint,
    Article,
}

/// Stateful citation formatter for one workflow run.
///
/// Tracks used citation keys so collisions resolve deterministically with
/// the suffix sequence `_a..=_z` then `_1, _2, ...`.
pub struct CitationFormatter {
    used_keys: HashSet<String>,
    paper_counter: u32,
}

impl Default for CitationFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationFormatter {
    pub fn new() -> Self {
        Self {
            used_keys: HashSet::new(),
            paper_counter: 1,
        }
    }

    /// Generate a unique citation key: first-author last name (alphabetic,
    /// lowercased) plus publication year, `paperN` when no author is known.
    pub fn generate_citation_key(&mut self, paper: &Paper) -> String {
        let last_name = paper
            .authors
            .first()
            .map(|a| clean_author_name(a))
            .and_then(|a| {
                a.split_whitespace()
                    .last()
                    .map(|l| l.chars().filter(|c| c.is_ascii_alphabetic()).collect::<String>())
            })
            .map(|l| l.to_lowercase())
            .filter(|l| !l.is_empty());

        let base = match last_name {
            Some(name) => format!("{name}{}", key_year(paper)),
            None => {
                let key = format!("paper{}", self.paper_counter);
                self.paper_counter += 1;
                key
            }
        };

        let mut key = base.clone();
        let mut suffix = 1u32;
        while self.used_keys.contains(&key) {
            key = if suffix <= 26 {
                let letter = char::from(b'a' + (suffix - 1) as u8);
                format!("{base}_{letter}")
            } else {
                format!("{base}_{}", suffix - 26)
            };
            suffix += 1;
        }

        self.used_keys.insert(key.clone());
        key
    }

    /// Build the full [`Citation`] record for a paper.
    pub fn create_citation(&mut self, paper: &Paper) -> Citation {
        let citation_key = self.generate_citation_key(paper);
        Citation {
            id: format!("cite:{citation_key}"),
            paper_id: paper.id.clone(),
            apa: format_apa(paper),
            mla: format_mla(paper),
            bibtex: format_bibtex(paper, &citation_key),
            chicago: Some(format_chicago(paper)),
            citation_key,
        }
    }
}

fn key_year(paper: &Paper) -> i32 {
    use chrono::Datelike;
    paper.year().unwrap_or_else(|| paper.created_at.year())
}

/// Strip institutional affiliations and ORCID parentheticals from a name.
pub fn clean_author_name(name: &str) -> String {
    static PAREN: OnceLock<Regex> = OnceLock::new();
    let re = PAREN.get_or_init(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("static pattern"));
    let cleaned = re.replace_all(name.trim(), "").trim().to_string();
    if cleaned.is_empty() {
        "Unknown Author".to_string()
    } else {
        cleaned
    }
}

fn split_name(name: &str) -> (String, String) {
    let cleaned = clean_author_name(name);
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => ((*last).to_string(), rest.join(" ")),
        _ => (cleaned, String::new()),
    }
}

/// `Last, F. M.` form used by APA.
fn apa_author(name: &str) -> String {
    let (last, first) = split_name(name);
    if first.is_empty() {
        return last;
    }
    let initials: Vec<String> = first
        .split_whitespace()
        .filter_map(|part| part.chars().next())
        .map(|c| format!("{}.", c.to_uppercase()))
        .collect();
    format!("{last}, {}", initials.join(" "))
}

/// `Last, First` form used by MLA and Chicago first authors.
fn inverted_author(name: &str) -> String {
    let (last, first) = split_name(name);
    if first.is_empty() {
        last
    } else {
        format!("{last}, {first}")
    }
}

fn clean_authors(paper: &Paper) -> Vec<String> {
    paper
        .authors
        .iter()
        .map(|a| clean_author_name(a))
        .filter(|a| a != "Unknown Author")
        .collect()
}

fn apa_authors(paper: &Paper) -> String {
    let authors = clean_authors(paper);
    let formatted: Vec<String> = authors.iter().map(|a| apa_author(a)).collect();
    match formatted.len() {
        0 => "Unknown Author".to_string(),
        1 => formatted[0].clone(),
        2 => format!("{} & {}", formatted[0], formatted[1]),
        n if n <= 20 => format!(
            "{}, & {}",
            formatted[..n - 1].join(", "),
            formatted[n - 1]
        ),
        _ => format!("{}, et al.", formatted[..20].join(", ")),
    }
}

fn mla_authors(paper: &Paper) -> String {
    let authors = clean_authors(paper);
    match authors.len() {
        0 => "Unknown Author".to_string(),
        1 => inverted_author(&authors[0]),
        _ => format!("{}, et al.", inverted_author(&authors[0])),
    }
}

fn bibtex_authors(paper: &Paper) -> String {
    let authors = clean_authors(paper);
    if authors.is_empty() {
        "Unknown Author".to_string()
    } else {
        authors.join(" and ")
    }
}

fn chicago_authors(paper: &Paper) -> String {
    let authors = clean_authors(paper);
    match authors.len() {
        0 => "Unknown Author".to_string(),
        1 => inverted_author(&authors[0]),
        n if n <= 10 => {
            let mut parts = vec![inverted_author(&authors[0])];
            for author in &authors[1..n - 1] {
                parts.push(author.clone());
            }
            format!("{}, and {}", parts.join(", "), authors[n - 1])
        }
        _ => format!("{}, et al.", inverted_author(&authors[0])),
    }
}

/// Venue label and publication type, with source-derived defaults when the
/// paper carries no venue.
pub fn extract_venue_info(paper: &Paper) -> (String, PubType) {
    let Some(venue) = paper.venue.as_deref().filter(|v| !v.is_empty()) else {
        if paper.arxiv_id.as_deref().is_some_and(|a| !a.is_empty()) {
            return ("arXiv preprint".to_string(), PubType::Preprint);
        }
        if paper.id.contains("openalex") || paper.id.contains("crossref") {
            return ("Academic Database".to_string(), PubType::Article);
        }
        return ("Retrieved from web".to_string(), PubType::Article);
    };

    let lower = venue.to_lowercase();
    let pub_type = if ["journal", "transactions", "review", "letters"]
        .iter()
        .any(|w| lower.contains(w))
    {
        PubType::Journal
    } else if ["conference", "proceedings", "workshop", "symposium"]
        .iter()
        .any(|w| lower.contains(w))
    {
        PubType::Conference
    } else if lower.contains("arxiv") {
        PubType::Preprint
    } else {
        PubType::Article
    };

    (venue.to_string(), pub_type)
}

fn best_url(paper: &Paper) -> String {
    match paper.doi.as_deref().filter(|d| !d.is_empty()) {
        Some(doi) => format!("https://doi.org/{doi}"),
        None => paper.url.clone(),
    }
}

/// APA 7th edition entry.
pub fn format_apa(paper: &Paper) -> String {
    let authors = apa_authors(paper);
    let year = paper
        .year()
        .map_or_else(|| "n.d.".to_string(), |y| y.to_string());
    let mut title = paper.title.trim().to_string();
    if !title.ends_with('.') {
        title.push('.');
    }
    let (venue, _) = extract_venue_info(paper);
    format!("{authors} ({year}). {title} *{venue}*. {}", best_url(paper))
}

/// MLA entry.
pub fn format_mla(paper: &Paper) -> String {
    let authors = mla_authors(paper);
    let (venue, _) = extract_venue_info(paper);
    let date = paper.published_date.map_or_else(
        || "n.d.".to_string(),
        |d| d.format("%-d %b. %Y").to_string(),
    );
    format!(
        "{authors}. \"{}.\" *{venue}*, {date}, {}.",
        paper.title.trim(),
        best_url(paper)
    )
}

/// Chicago author-date entry.
pub fn format_chicago(paper: &Paper) -> String {
    let authors = chicago_authors(paper);
    let year = paper
        .year()
        .map_or_else(|| "n.d.".to_string(), |y| y.to_string());
    let (venue, _) = extract_venue_info(paper);
    format!(
        "{authors}. \"{}.\" *{venue}* ({year}). {}.",
        paper.title.trim(),
        best_url(paper)
    )
}

/// Escape LaTeX special characters for BibTeX field values.
fn bibtex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("\\&"),
            '%' => out.push_str("\\%"),
            '$' => out.push_str("\\$"),
            '#' => out.push_str("\\#"),
            '_' => out.push_str("\\_"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            other => out.push(other),
        }
    }
    out
}

/// BibTeX entry with entry type derived from the venue class.
pub fn format_bibtex(paper: &Paper, citation_key: &str) -> String {
    let (venue, pub_type) = extract_venue_info(paper);
    let entry_type = match pub_type {
        PubType::Journal => "article",
        PubType::Conference => "inproceedings",
        PubType::Preprint | PubType::Article if paper.arxiv_id.is_some() => "misc",
        PubType::Preprint => "misc",
        PubType::Article => "article",
    };

    let mut lines = vec![format!("@{entry_type}{{{citation_key},")];
    lines.push(format!("  title={{{}}},", bibtex_escape(paper.title.trim())));
    lines.push(format!("  author={{{}}},", bibtex_escape(&bibtex_authors(paper))));
    lines.push(format!("  year={{{}}},", key_year(paper)));

    if !matches!(venue.as_str(), "Academic Database" | "Retrieved from web") {
        let venue_clean = bibtex_escape(&venue);
        match entry_type {
            "article" => lines.push(format!("  journal={{{venue_clean}}},")),
            "inproceedings" => lines.push(format!("  booktitle={{{venue_clean}}},")),
            _ => lines.push(format!("  howpublished={{{venue_clean}}},")),
        }
    }

    if let Some(doi) = paper.doi.as_deref().filter(|d| doi_pattern().is_match(d.trim())) {
        lines.push(format!("  doi={{{}}},", doi.trim()));
    }

    if let Some(arxiv_id) = paper.arxiv_id.as_deref().filter(|a| !a.is_empty()) {
        lines.push("  archivePrefix={arXiv},".to_string());
        lines.push(format!("  eprint={{{arxiv_id}}},"));
    }

    if !paper.keywords.is_empty() {
        let keywords = paper.keywords.iter().take(10).cloned().collect::<Vec<_>>();
        lines.push(format!("  keywords={{{}}},", bibtex_escape(&keywords.join(", "))));
    }

    let source_note = match paper.id.to_lowercase() {
        id if id.contains("openalex") => Some("Retrieved from OpenAlex database"),
        id if id.contains("crossref") => Some("Retrieved from CrossRef database"),
        id if id.contains("arxiv") => Some("Retrieved from arXiv"),
        _ => None,
    };
    if let Some(note) = source_note {
        lines.push(format!("  note={{{note}}},"));
    }

    if !paper.url.is_empty() {
        lines.push(format!("  url={{{}}}", paper.url));
    } else if let Some(last) = lines.last_mut() {
        // Strip the trailing comma from the final field.
        if last.ends_with(',') {
            last.pop();
        }
    }

    lines.push("}".to_string());
    lines.join("\n")
}

/// Sort key for APA bibliography order: first-author last name, lowercased,
/// falling back to the title.
pub fn apa_sort_key(paper: &Paper) -> String {
    clean_authors(paper)
        .first()
        .map(|a| split_name(a).0.to_lowercase())
        .unwrap_or_else(|| paper.title.to_lowercase())
}

/// Assemble the APA bibliography for a set of citations.
///
/// Entries are sorted by first-author last name ascending; citations whose
/// paper is missing from `papers` sort by their formatted entry.
pub fn create_bibliography(citations: &[Citation], papers: &[Paper]) -> String {
    let mut entries: Vec<(String, &str)> = citations
        .iter()
        .map(|citation| {
            let key = papers
                .iter()
                .find(|p| p.id == citation.paper_id)
                .map_or_else(|| citation.apa.to_lowercase(), apa_sort_key);
            (key, citation.apa.as_str())
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    entries
        .into_iter()
        .map(|(_, apa)| apa)
        .collect::<Vec<_>>()
        .join("\n\n")
}

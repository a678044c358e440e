//! The `Paper` entity and its derived source tag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a paper was discovered, or what kind of venue published it.
///
/// Derived from the paper's identifiers when not set explicitly at
/// ingestion; never persisted separately from the paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceTag {
    ArXiv,
    CrossRef,
    OpenAlex,
    Conference,
    Journal,
    /// A venue label that matched none of the known classes.
    Venue(String),
    Unknown,
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTag::ArXiv => write!(f, "ArXiv"),
            SourceTag::CrossRef => write!(f, "CrossRef"),
            SourceTag::OpenAlex => write!(f, "OpenAlex"),
            SourceTag::Conference => write!(f, "Conference"),
            SourceTag::Journal => write!(f, "Journal"),
            SourceTag::Venue(v) => write!(f, "{v}"),
            SourceTag::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A research paper as ingested from a bibliographic source.
///
/// Immutable after ingestion: later stages reference papers by id and never
/// mutate them. Ids are source-prefixed (`arxiv_2301.00001`,
/// `openalex_W2031...`, `crossref_10.1038/...`) and unique per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// Stable source-prefixed identifier.
    pub id: String,
    /// Paper title.
    pub title: String,
    /// Author display names in citation order.
    pub authors: Vec<String>,
    /// Abstract text. May be empty when the source carries none.
    #[serde(default)]
    pub abstract_text: String,
    /// Canonical URL for the paper.
    pub url: String,
    /// Publication date, when known.
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    /// Venue label (journal, conference, repository).
    #[serde(default)]
    pub venue: Option<String>,
    /// Citation count reported by the source.
    #[serde(default)]
    pub citations: u32,
    /// Digital Object Identifier, validated as `10.xxxx/...` when present.
    #[serde(default)]
    pub doi: Option<String>,
    /// arXiv identifier, when the paper is an arXiv record.
    #[serde(default)]
    pub arxiv_id: Option<String>,
    /// Keywords supplied by the source.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Full-text payload, fetched lazily by callers that need it.
    #[serde(default)]
    pub full_text: Option<String>,
    /// Explicit source tag set at ingestion. When `None`, [`Paper::source`]
    /// infers one from the identifiers.
    #[serde(default)]
    pub source: Option<SourceTag>,
    /// Ingestion timestamp.
    pub created_at: DateTime<Utc>,
}

impl Paper {
    /// The paper's source tag: explicit if set, otherwise inferred in order
    /// arXiv id, DOI, venue substring, `Unknown`.
    pub fn source(&self) -> SourceTag {
        if let Some(tag) = &self.source {
            return tag.clone();
        }
        if self.arxiv_id.as_deref().is_some_and(|a| !a.is_empty()) {
            return SourceTag::ArXiv;
        }
        if self.doi.as_deref().is_some_and(|d| !d.is_empty()) {
            return SourceTag::CrossRef;
        }
        if let Some(venue) = self.venue.as_deref().filter(|v| !v.is_empty()) {
            let lower = venue.to_lowercase();
            if lower.contains("arxiv") {
                return SourceTag::ArXiv;
            }
            if lower.contains("conference") || lower.contains("proceedings") {
                return SourceTag::Conference;
            }
            if lower.contains("journal") || lower.contains("trans") {
                return SourceTag::Journal;
            }
            return SourceTag::Venue(venue.to_string());
        }
        SourceTag::Unknown
    }

    /// Publication year, when the date is known.
    pub fn year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.published_date.map(|d| d.year())
    }

    /// Whether the DOI, if present, matches the `10.xxxx/...` registrant form.
    pub fn doi_is_valid(&self) -> bool {
        match self.doi.as_deref() {
            None => true,
            Some(doi) => crate::citation::doi_pattern().is_match(doi.trim()),
        }
    }

    /// The text used for relevance scoring and content extraction:
    /// full text when available, otherwise the abstract.
    pub fn content(&self) -> &str {
        match self.full_text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => &self.abstract_text,
        }
    }
}

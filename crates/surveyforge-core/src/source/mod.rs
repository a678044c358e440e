//! Bibliographic source adapter contract.
//!
//! Concrete HTTP clients for arXiv, OpenAlex, and CrossRef live outside the
//! core; they implement [`SourceAdapter`] and are responsible only for
//! translating between the service's wire format and [`Paper`]. Adapters do
//! no caching, no retry, and no ranking; the literature stage owns those.

use chrono::{DateTime, Utc};

use crate::error::SourceError;
use crate::model::Paper;

/// The three bibliographic services the literature stage fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    ArXiv,
    OpenAlex,
    CrossRef,
}

impl SourceKind {
    /// All sources, in fan-out order.
    pub const ALL: [SourceKind; 3] = [SourceKind::ArXiv, SourceKind::OpenAlex, SourceKind::CrossRef];

    /// Stable lowercase name, used for paper id prefixes and config keys.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::ArXiv => "arxiv",
            SourceKind::OpenAlex => "openalex",
            SourceKind::CrossRef => "crossref",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait abstracting one bibliographic source.
///
/// Object-safe for use as `Arc<dyn SourceAdapter>`; the literature stage
/// holds one adapter per [`SourceKind`].
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which service this adapter fronts.
    fn kind(&self) -> SourceKind;

    /// Free-text search returning at most `max_results` papers, each tagged
    /// with this adapter's source.
    ///
    /// Fails with [`SourceError::Unavailable`] on transport errors,
    /// [`SourceError::RateLimited`] when the service throttles, and
    /// [`SourceError::InvalidResponse`] on malformed payloads.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        date_from: Option<DateTime<Utc>>,
    ) -> Result<Vec<Paper>, SourceError>;

    /// Lookup a single paper by DOI, used by the citation stage for
    /// enrichment. Adapters without DOI lookup return `Ok(None)`.
    async fn get_by_doi(&self, _doi: &str) -> Result<Option<Paper>, SourceError> {
        Ok(None)
    }
}

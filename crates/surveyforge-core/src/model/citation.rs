//! Formatted citations.

use serde::{Deserialize, Serialize};

/// A paper's citation in the supported styles.
///
/// Citation keys are unique per workflow run; collisions are resolved with
/// the suffix sequence `_a..=_z` then `_1, _2, ...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Deterministic id: `cite:{citation_key}`.
    pub id: String,
    /// Id of the cited paper.
    pub paper_id: String,
    /// Unique citation key, e.g. `lovelace2023` or `lovelace2023_a`.
    pub citation_key: String,
    /// APA 7th edition format.
    pub apa: String,
    /// MLA format.
    pub mla: String,
    /// BibTeX entry.
    pub bibtex: String,
    /// Chicago format, when produced.
    #[serde(default)]
    pub chicago: Option<String>,
}

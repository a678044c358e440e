//! Research notes extracted from paper content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum note content length after clamping.
pub const MAX_NOTE_CHARS: usize = 500;

/// The kind of content a note captures.
///
/// Section extraction produces the first six kinds; insight extraction
/// produces `KeyFinding`, `Methodology`, `Limitations`, and `FutureWork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    Abstract,
    Introduction,
    Methodology,
    Findings,
    Limitations,
    FutureWork,
    KeyFinding,
}

impl NoteKind {
    /// Stable snake_case label, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            NoteKind::Abstract => "abstract",
            NoteKind::Introduction => "introduction",
            NoteKind::Methodology => "methodology",
            NoteKind::Findings => "findings",
            NoteKind::Limitations => "limitations",
            NoteKind::FutureWork => "future_work",
            NoteKind::KeyFinding => "key_finding",
        }
    }

    /// Parse a label produced by [`NoteKind::as_str`] or an LLM `TYPE:` field.
    ///
    /// Unrecognized insight types default to `KeyFinding`, mirroring how the
    /// insight parser treats them.
    pub fn parse(s: &str) -> Option<NoteKind> {
        match s.trim().to_lowercase().as_str() {
            "abstract" => Some(NoteKind::Abstract),
            "introduction" => Some(NoteKind::Introduction),
            "methodology" => Some(NoteKind::Methodology),
            "findings" => Some(NoteKind::Findings),
            "limitations" | "limitation" => Some(NoteKind::Limitations),
            "future_work" => Some(NoteKind::FutureWork),
            "key_finding" => Some(NoteKind::KeyFinding),
            _ => None,
        }
    }
}

impl std::fmt::Display for NoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fragment of extracted knowledge attached to exactly one paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchNote {
    /// Deterministic id: `{paper_id}:note:{seq}`.
    pub id: String,
    /// Id of the paper this note was extracted from.
    pub paper_id: String,
    /// Note content, clamped to [`MAX_NOTE_CHARS`].
    pub content: String,
    /// What kind of content this note captures.
    pub note_type: NoteKind,
    /// Extraction confidence in `[0, 1]`.
    pub confidence: f64,
    /// Extraction timestamp.
    pub created_at: DateTime<Utc>,
}

impl ResearchNote {
    /// Build a note with deterministic id and clamped content.
    pub fn new(
        paper_id: &str,
        seq: usize,
        content: impl Into<String>,
        note_type: NoteKind,
        confidence: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{paper_id}:note:{seq}"),
            paper_id: paper_id.to_string(),
            content: clamp_content(&content.into()),
            note_type,
            confidence: confidence.clamp(0.0, 1.0),
            created_at,
        }
    }
}

/// Clamp content to [`MAX_NOTE_CHARS`] at a character boundary.
fn clamp_content(content: &str) -> String {
    if content.chars().count() <= MAX_NOTE_CHARS {
        content.to_string()
    } else {
        content.chars().take(MAX_NOTE_CHARS).collect()
    }
}

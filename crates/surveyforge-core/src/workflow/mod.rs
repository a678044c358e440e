//! Workflow layer: the five research stages and their orchestration.
//!
//! Each stage defines explicit typed IO and composes the leaf subsystems
//! (source adapters, rate limiters, dedup, LLM gateway, citation formatter,
//! persistent store). Stages never reach into shared globals; everything
//! they touch is passed in at the call site.

pub mod citations;
pub mod draft;
pub mod literature;
pub mod notes;
pub mod orchestrate;
pub mod themes;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{CheckpointError, LlmError, SourceError, StorageError};
use crate::llm::safety::Domain;

// ── Stage names ──────────────────────────────────────────────────────

/// The five top-level workflow stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    LiteratureSurvey,
    NoteTaking,
    ThemeSynthesis,
    Citations,
    DraftWriting,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [StageName; 5] = [
        StageName::LiteratureSurvey,
        StageName::NoteTaking,
        StageName::ThemeSynthesis,
        StageName::Citations,
        StageName::DraftWriting,
    ];

    /// Stable snake_case label used in checkpoint file names.
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::LiteratureSurvey => "literature_survey",
            StageName::NoteTaking => "note_taking",
            StageName::ThemeSynthesis => "theme_synthesis",
            StageName::Citations => "citations",
            StageName::DraftWriting => "draft_writing",
        }
    }

    /// 1-based progress step number.
    pub fn step(self) -> u32 {
        match self {
            StageName::LiteratureSurvey => 1,
            StageName::NoteTaking => 2,
            StageName::ThemeSynthesis => 3,
            StageName::Citations => 4,
            StageName::DraftWriting => 5,
        }
    }

    /// Default per-stage timeout in seconds.
    pub fn default_timeout_secs(self) -> u64 {
        match self {
            StageName::LiteratureSurvey | StageName::NoteTaking | StageName::DraftWriting => 1200,
            StageName::ThemeSynthesis | StageName::Citations => 600,
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── WorkflowError ────────────────────────────────────────────────────

/// Errors from workflow stages and the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// No source produced any paper; the workflow cannot proceed.
    #[error("NoPapersFound")]
    NoPapersFound,

    /// Bad workflow options; reported before any work starts.
    #[error("invalid workflow options: {0}")]
    Validation(String),

    /// A stage exceeded its timeout.
    #[error("stage {stage} timed out after {seconds}s")]
    StageTimeout {
        /// The stage that timed out.
        stage: StageName,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// A stage exhausted its retries.
    #[error("stage {stage} failed: {message}")]
    StageFailed {
        /// The stage that failed.
        stage: StageName,
        /// The final error message.
        message: String,
    },

    /// The workflow was cancelled.
    #[error("workflow cancelled")]
    Cancelled,

    /// Source adapter error that survived stage-level retries.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// LLM error that was not absorbed by the gateway.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Persistent store error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Checkpoint store error.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl WorkflowError {
    /// Whether this error looks like a remote-API failure that should arm
    /// the LLM gateway's process-wide cooldown before the next retry.
    pub fn is_api_class(&self) -> bool {
        if matches!(self, WorkflowError::StageTimeout { .. }) {
            return true;
        }
        let message = self.to_string().to_lowercase();
        ["timeout", "timed out", "503", "unavailable", "quota", "rate"]
            .iter()
            .any(|kw| message.contains(kw))
    }
}

// ── Shared IO types ─────────────────────────────────────────────────

/// Callback receiving `(step, description)` progress updates.
pub type ProgressCallback = Arc<dyn Fn(u32, &str) + Send + Sync>;

/// The kind of document the draft stage produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperType {
    #[default]
    Survey,
    Review,
    Analysis,
}

impl PaperType {
    /// Parse a paper-type label.
    pub fn parse(s: &str) -> Option<PaperType> {
        match s.trim().to_lowercase().as_str() {
            "survey" => Some(PaperType::Survey),
            "review" => Some(PaperType::Review),
            "analysis" => Some(PaperType::Analysis),
            _ => None,
        }
    }

    /// Document title prefix for this paper type.
    pub fn title_prefix(self) -> &'static str {
        match self {
            PaperType::Survey => "A Survey of",
            PaperType::Review => "A Review of",
            PaperType::Analysis => "An Analysis of",
        }
    }
}

/// One theme-driven body section of the draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeSection {
    /// Section key, `theme_1..theme_N`.
    pub key: String,
    /// Section title (the theme title).
    pub title: String,
    /// Generated section prose.
    pub content: String,
}

/// Provenance metadata attached to a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftMetadata {
    /// Detected research domain.
    pub domain: Domain,
    /// Per-section generation outcomes (`abstract: success`, ...).
    pub generation_log: Vec<String>,
    /// Whether every section passed content-safety validation.
    pub safety_validated: bool,
    /// Keys of sections filled with templated fallback prose.
    pub fallback_sections: Vec<String>,
    /// Counts recorded at generation time.
    pub themes_count: usize,
    pub papers_count: usize,
    pub gaps_count: usize,
}

/// The structured survey draft produced by the draft stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub title: String,
    pub abstract_text: String,
    pub introduction: String,
    /// Theme body sections in order.
    pub sections: Vec<ThemeSection>,
    pub discussion: String,
    pub conclusion: String,
    /// Assembled bibliography; filled by the orchestrator's post-pass.
    #[serde(default)]
    pub bibliography: String,
    pub metadata: DraftMetadata,
}

/// Options accepted by `Workflow::execute`.
#[derive(Clone, Default)]
pub struct WorkflowOptions {
    /// Specific aspects of the topic to emphasize in search queries.
    pub aspects: Vec<String>,
    /// Maximum papers to keep after dedup and ranking. 0 means default (100).
    pub max_papers: usize,
    /// Kind of document to draft.
    pub paper_type: PaperType,
    /// Only consider papers published at or after this date.
    pub date_from: Option<DateTime<Utc>>,
    /// Progress callback receiving `(step, description)`.
    pub progress_callback: Option<ProgressCallback>,
    /// Resume from fresh checkpoints when available.
    pub resume_from_checkpoint: Option<bool>,
    /// Cooperative cancellation signal.
    pub cancel: Option<tokio_util::sync::CancellationToken>,
}

/// Counts summarizing a workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub papers_found: usize,
    pub notes_extracted: usize,
    pub themes_identified: usize,
    pub gaps_identified: usize,
    pub citations_generated: usize,
}

/// Everything a workflow run produced, partial results included.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    /// Whether the run completed all stages.
    pub success: bool,
    /// The topic as the caller provided it.
    pub research_topic: String,
    /// Wall-clock execution time in seconds.
    pub execution_time_secs: f64,
    /// Run statistics.
    pub statistics: WorkflowStatistics,
    pub papers: Vec<crate::model::Paper>,
    pub notes: Vec<crate::model::ResearchNote>,
    pub themes: Vec<crate::model::ResearchTheme>,
    pub gaps: Vec<String>,
    pub citations: Vec<crate::model::Citation>,
    pub draft: Option<Draft>,
    /// Assembled bibliography text.
    pub bibliography: String,
    /// Rendered citation quality report.
    pub citation_report: String,
    /// Terminal error description when `success` is false.
    pub error: Option<String>,
}

// ── Re-exports for convenience ──────────────────────────────────────

pub use orchestrate::{Workflow, WorkflowStatus};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_and_steps() {
        assert_eq!(StageName::LiteratureSurvey.as_str(), "literature_survey");
        assert_eq!(StageName::DraftWriting.as_str(), "draft_writing");
        let steps: Vec<u32> = StageName::ALL.iter().map(|s| s.step()).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn stage_default_timeouts() {
        assert_eq!(StageName::LiteratureSurvey.default_timeout_secs(), 1200);
        assert_eq!(StageName::ThemeSynthesis.default_timeout_secs(), 600);
        assert_eq!(StageName::Citations.default_timeout_secs(), 600);
        assert_eq!(StageName::DraftWriting.default_timeout_secs(), 1200);
    }

    #[test]
    fn no_papers_error_is_terminal_marker() {
        assert_eq!(WorkflowError::NoPapersFound.to_string(), "NoPapersFound");
    }

    #[test]
    fn api_class_detection() {
        let err = WorkflowError::StageFailed {
            stage: StageName::NoteTaking,
            message: "LLM rate limited, retry after 30 seconds".to_string(),
        };
        assert!(err.is_api_class());

        let err = WorkflowError::StageFailed {
            stage: StageName::NoteTaking,
            message: "parse failure".to_string(),
        };
        assert!(!err.is_api_class());

        let err = WorkflowError::StageTimeout {
            stage: StageName::ThemeSynthesis,
            seconds: 600,
        };
        assert!(err.is_api_class(), "timeouts count as API-class");
    }

    #[test]
    fn paper_type_parse_and_prefix() {
        assert_eq!(PaperType::parse("survey"), Some(PaperType::Survey));
        assert_eq!(PaperType::parse("Review"), Some(PaperType::Review));
        assert_eq!(PaperType::parse("essay"), None);
        assert_eq!(PaperType::Analysis.title_prefix(), "An Analysis of");
    }
}

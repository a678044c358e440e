//! Configuration for the research workflow core.
//!
//! The core recognizes a fixed set of options; file discovery and
//! environment overrides are the consuming binary's job. `Config` parses
//! from TOML with full defaults, so an empty document is a valid
//! configuration apart from the LLM API key.

mod defaults;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the workflow core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Workflow retry, timeout, and batching behavior.
    #[serde(default)]
    pub research: ResearchConfig,

    /// Checkpoint and database locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Language-model provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Per-source request pacing.
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
}

/// Workflow retry, timeout, and batching behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResearchConfig {
    /// Retries per stage after the initial attempt.
    pub max_retries: u32,
    /// Default per-stage timeout in seconds.
    pub step_timeout_secs: u64,
    /// Process-wide LLM cooldown after quota/rate errors, in seconds.
    pub api_cooldown_secs: u64,
    /// Enable intra-batch parallelism in the note stage.
    pub parallel_processing: bool,
    /// Enable checkpointing entirely.
    pub checkpoint_enabled: bool,
    /// Papers per note-extraction batch.
    pub batch_size: usize,
    /// Minimum notes per cluster for theme synthesis.
    pub min_cluster_size: usize,
    /// Average-Jaccard threshold for joining a note to an existing cluster.
    pub similarity_threshold: f64,
}

/// Checkpoint and database locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding checkpoint files.
    pub cache_dir: String,
    /// SQLite database path for the default persistent store.
    pub db_path: String,
}

/// Language-model provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider name. Only `gemini` ships with the core.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Provider API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base sampling temperature for the first generation attempt.
    pub temperature: f32,
    /// Maximum tokens per completion.
    pub max_tokens: u32,
    /// Minimum milliseconds between provider calls.
    pub min_request_interval_ms: u64,
}

/// Per-source request pacing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitsConfig {
    /// arXiv requests per second.
    pub arxiv: f64,
    /// OpenAlex requests per second.
    pub openalex: f64,
    /// CrossRef requests per second.
    pub crossref: f64,
    /// Mandatory minimum inter-request delay in milliseconds, all sources.
    pub min_delay_ms: u64,
}

impl Config {
    /// Parse a configuration from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError { source: e })
    }

    /// Validate the configuration, returning all errors found (not just the first).
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.llm.provider != "gemini" {
            errors.push(ConfigError::InvalidValue {
                field: "llm.provider".to_string(),
                message: "must be gemini".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.llm.temperature) {
            errors.push(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }

        if self.research.batch_size == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "research.batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.research.min_cluster_size < 2 {
            errors.push(ConfigError::InvalidValue {
                field: "research.min_cluster_size".to_string(),
                message: "must be at least 2".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.research.similarity_threshold) {
            errors.push(ConfigError::InvalidValue {
                field: "research.similarity_threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }

        for (field, rps) in [
            ("rate_limits.arxiv", self.rate_limits.arxiv),
            ("rate_limits.openalex", self.rate_limits.openalex),
            ("rate_limits.crossref", self.rate_limits.crossref),
        ] {
            if rps <= 0.0 || !rps.is_finite() {
                errors.push(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "must be a positive requests-per-second value".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

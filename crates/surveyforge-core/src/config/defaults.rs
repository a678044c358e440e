//! Default values for all configuration sections.
//!
//! These defaults match the workflow contract; an empty config file is a
//! working configuration apart from the LLM API key.

use super::{LlmConfig, RateLimitsConfig, ResearchConfig, StorageConfig};

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            step_timeout_secs: 1200,
            api_cooldown_secs: 60,
            parallel_processing: true,
            checkpoint_enabled: true,
            batch_size: 2,
            min_cluster_size: 3,
            similarity_threshold: 0.2,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: "data/cache".to_string(),
            db_path: "data/research.db".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens: 4096,
            min_request_interval_ms: 500,
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            arxiv: 0.33,
            openalex: 10.0,
            crossref: 1.0,
            min_delay_ms: 100,
        }
    }
}

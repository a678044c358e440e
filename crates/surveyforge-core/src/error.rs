//! Error types for the Surveyforge core library.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration parsing and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// TOML deserialization failed.
    #[error("failed to parse config: {source}")]
    ParseError {
        /// The underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from bibliographic source adapters (arXiv, OpenAlex, CrossRef).
///
/// This is the failure taxonomy every adapter implementation must map its
/// transport and payload errors into. The literature stage retries
/// `Unavailable` and `RateLimited`; `InvalidResponse` is not retried.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The remote service could not be reached or returned a transport error.
    #[error("source {source_name} unavailable: {message}")]
    Unavailable {
        /// The source that failed.
        source_name: String,
        /// Details about the transport failure.
        message: String,
    },

    /// The remote service signalled throttling.
    #[error("source {source_name} rate limited{}", match .retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    })]
    RateLimited {
        /// The source that throttled us.
        source_name: String,
        /// Seconds to wait before retrying, if provided by the service.
        retry_after_secs: Option<u64>,
    },

    /// The remote service returned a payload that could not be interpreted.
    #[error("source {source_name} returned invalid response: {message}")]
    InvalidResponse {
        /// The source that misbehaved.
        source_name: String,
        /// Details about the malformed payload.
        message: String,
    },
}

/// Errors from the language-model provider and gateway.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request to the LLM endpoint failed.
    #[error("LLM HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// LLM API returned an error response.
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// LLM provider rate limit hit.
    #[error("LLM rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// LLM provider quota exhausted for the billing period.
    #[error("LLM quota exceeded: {message}")]
    QuotaExceeded {
        /// Details from the provider.
        message: String,
    },

    /// The provider reported a safety block for the prompt or response.
    #[error("LLM response blocked by safety filter")]
    SafetyBlocked,

    /// The request timed out.
    #[error("LLM request timed out after {seconds}s")]
    Timeout {
        /// Number of seconds waited before timing out.
        seconds: u64,
    },

    /// LLM response could not be parsed.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// All generation attempts exhausted without a usable response.
    #[error("LLM unavailable: {0}")]
    Unavailable(String),
}

impl LlmError {
    /// Whether this error should arm the process-wide generation cooldown.
    ///
    /// Quota and rate-class errors pause all callers; timeouts do not.
    pub fn triggers_cooldown(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::QuotaExceeded { .. }
        )
    }
}

/// Errors from SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to connect to SQLite database.
    #[error("database connection error: {source}")]
    Connection {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed.
    #[error("database migration error: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// A database query failed.
    #[error("database query error: {source}")]
    Query {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },
}

/// Errors from the checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// File I/O failed while reading or writing a checkpoint.
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        /// The checkpoint file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint file exists but could not be deserialized.
    ///
    /// Callers treat this as an absent checkpoint.
    #[error("checkpoint corrupt at {path}: {message}")]
    Corrupt {
        /// The checkpoint file path.
        path: String,
        /// Details about the parse failure.
        message: String,
    },

    /// The stage payload could not be serialized to JSON.
    #[error("checkpoint payload serialization failed: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_missing_field_message() {
        let err = ConfigError::MissingField {
            field: "llm.api_key".to_string(),
        };
        assert_eq!(err.to_string(), "missing required config field: llm.api_key");
    }

    #[test]
    fn config_error_invalid_value_message() {
        let err = ConfigError::InvalidValue {
            field: "rate_limits.arxiv".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for config field 'rate_limits.arxiv': must be positive"
        );
    }

    #[test]
    fn source_error_rate_limited_with_retry() {
        let err = SourceError::RateLimited {
            source_name: "openalex".to_string(),
            retry_after_secs: Some(30),
        };
        assert_eq!(
            err.to_string(),
            "source openalex rate limited, retry after 30s"
        );
    }

    #[test]
    fn source_error_rate_limited_without_retry() {
        let err = SourceError::RateLimited {
            source_name: "arxiv".to_string(),
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "source arxiv rate limited");
    }

    #[test]
    fn source_error_unavailable_message() {
        let err = SourceError::Unavailable {
            source_name: "crossref".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "source crossref unavailable: connection refused"
        );
    }

    #[test]
    fn llm_error_rate_limited_message() {
        let err = LlmError::RateLimited {
            retry_after_secs: 45,
        };
        assert_eq!(err.to_string(), "LLM rate limited, retry after 45 seconds");
    }

    #[test]
    fn llm_error_safety_blocked_message() {
        assert_eq!(
            LlmError::SafetyBlocked.to_string(),
            "LLM response blocked by safety filter"
        );
    }

    #[test]
    fn llm_error_cooldown_classification() {
        assert!(LlmError::RateLimited {
            retry_after_secs: 10
        }
        .triggers_cooldown());
        assert!(LlmError::QuotaExceeded {
            message: "daily limit".to_string()
        }
        .triggers_cooldown());
        assert!(!LlmError::Timeout { seconds: 30 }.triggers_cooldown());
        assert!(!LlmError::SafetyBlocked.triggers_cooldown());
    }

    #[test]
    fn checkpoint_error_corrupt_message() {
        let err = CheckpointError::Corrupt {
            path: "data/cache/checkpoint_x_literature_survey.json".to_string(),
            message: "unexpected EOF".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "checkpoint corrupt at data/cache/checkpoint_x_literature_survey.json: unexpected EOF"
        );
    }
}

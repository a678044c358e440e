//! Per-stage workflow checkpoints.
//!
//! One JSON file per (topic slug, stage) under the configured cache
//! directory, named `checkpoint_<slug>_<stage>.json`. Writes are atomic
//! (temp file + rename). Checkpoints older than the freshness window are
//! ignored on load and may be garbage-collected by `clear`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CheckpointError;

/// Default freshness window: checkpoints older than this are ignored.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(24 * 60 * 60);

/// Normalize a research topic into a filesystem-safe slug.
///
/// Lowercases the topic and collapses each run of non-alphanumeric
/// characters into a single `_`.
pub fn topic_slug(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    let mut pending_sep = false;
    for c in topic.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// On-disk checkpoint envelope.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    timestamp: DateTime<Utc>,
    step: String,
    topic: String,
    data: Value,
}

/// Completion info for one stage, as reported by `get_workflow_status`.
#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    /// Whether a fresh checkpoint exists for the stage.
    pub completed: bool,
    /// Checkpoint timestamp, when present.
    pub timestamp: Option<DateTime<Utc>>,
    /// Element count of the stage payload when it is a list, else 0.
    pub data_size: usize,
}

/// File-backed checkpoint store keyed by (topic slug, stage name).
pub struct CheckpointStore {
    dir: PathBuf,
    freshness: Duration,
    enabled: bool,
}

impl CheckpointStore {
    /// Create a store rooted at `dir` with the default 24h freshness window.
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            freshness: DEFAULT_FRESHNESS,
            enabled,
        }
    }

    /// Override the freshness window (used by tests and long-running batch jobs).
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Whether checkpointing is enabled at all.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn file_path(&self, slug: &str, stage: &str) -> PathBuf {
        self.dir.join(format!("checkpoint_{slug}_{stage}.json"))
    }

    /// Persist a stage payload. No-op when the store is disabled.
    pub async fn save(&self, slug: &str, stage: &str, data: &Value) -> Result<(), CheckpointError> {
        if !self.enabled {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::Io {
                path: self.dir.display().to_string(),
                source: e,
            })?;

        let envelope = Envelope {
            timestamp: Utc::now(),
            step: stage.to_string(),
            topic: slug.to_string(),
            data: data.clone(),
        };
        let body = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| CheckpointError::Serialize { source: e })?;

        let path = self.file_path(slug, stage);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| CheckpointError::Io {
                path: tmp.display().to_string(),
                source: e,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointError::Io {
                path: path.display().to_string(),
                source: e,
            })?;

        tracing::debug!(slug = %slug, stage = %stage, "checkpoint saved");
        Ok(())
    }

    /// Load a stage payload if a fresh checkpoint exists.
    ///
    /// Corrupt or stale checkpoints are treated as absent (and logged); they
    /// never fail the caller.
    pub async fn load(&self, slug: &str, stage: &str) -> Option<Value> {
        let envelope = self.load_envelope(slug, stage).await?;
        Some(envelope.data)
    }

    async fn load_envelope(&self, slug: &str, stage: &str) -> Option<Envelope> {
        if !self.enabled {
            return None;
        }

        let path = self.file_path(slug, stage);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "checkpoint read failed");
                return None;
            }
        };

        let envelope: Envelope = match serde_json::from_slice(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                let err = CheckpointError::Corrupt {
                    path: path.display().to_string(),
                    message: e.to_string(),
                };
                tracing::warn!(error = %err, "treating corrupt checkpoint as absent");
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(envelope.timestamp);
        let freshness =
            chrono::Duration::from_std(self.freshness).unwrap_or(chrono::Duration::hours(24));
        if age > freshness {
            tracing::info!(slug = %slug, stage = %stage, "checkpoint too old, ignoring");
            return None;
        }

        Some(envelope)
    }

    /// Report completion status for a stage.
    pub async fn stage_status(&self, slug: &str, stage: &str) -> StageStatus {
        match self.load_envelope(slug, stage).await {
            Some(envelope) => StageStatus {
                completed: true,
                timestamp: Some(envelope.timestamp),
                data_size: envelope.data.as_array().map_or(0, Vec::len),
            },
            None => StageStatus {
                completed: false,
                timestamp: None,
                data_size: 0,
            },
        }
    }

    /// Remove every checkpoint for the topic.
    pub async fn clear(&self, slug: &str) -> Result<(), CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(CheckpointError::Io {
                    path: self.dir.display().to_string(),
                    source: e,
                })
            }
        };

        let prefix = format!("checkpoint_{slug}_");
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "checkpoint directory listing failed");
                    break;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) && name.ends_with(".json") {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    tracing::warn!(path = %entry.path().display(), error = %e, "checkpoint removal failed");
                }
            }
        }

        tracing::debug!(slug = %slug, "checkpoints cleared");
        Ok(())
    }

    /// The directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slug_lowercases_and_collapses_runs() {
        assert_eq!(topic_slug("Vision Transformers"), "vision_transformers");
        assert_eq!(topic_slug("LLMs -- a survey!?"), "llms_a_survey");
        assert_eq!(topic_slug("  edge   cases  "), "edge_cases");
        assert_eq!(topic_slug("already_clean"), "already_clean");
    }

    #[test]
    fn slug_of_symbols_only_is_empty() {
        assert_eq!(topic_slug("!!!"), "");
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), true);

        let payload = json!([{"id": "p1"}, {"id": "p2"}]);
        store
            .save("topic", "literature_survey", &payload)
            .await
            .expect("save");

        let loaded = store.load("topic", "literature_survey").await.expect("hit");
        assert_eq!(loaded, payload);
    }

    #[tokio::test]
    async fn load_missing_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), true);
        assert!(store.load("topic", "note_taking").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_checkpoint_treated_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), true);

        let path = dir.path().join("checkpoint_topic_citations.json");
        tokio::fs::write(&path, b"{not json")
            .await
            .expect("write corrupt file");

        assert!(store.load("topic", "citations").await.is_none());
    }

    #[tokio::test]
    async fn stale_checkpoint_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store =
            CheckpointStore::new(dir.path(), true).with_freshness(Duration::from_secs(0));

        store
            .save("topic", "draft_writing", &json!({"title": "x"}))
            .await
            .expect("save");

        // Zero-second freshness: anything already written is stale.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(store.load("topic", "draft_writing").await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_only_matching_topic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), true);

        store.save("alpha", "citations", &json!([1])).await.expect("save");
        store.save("alpha", "note_taking", &json!([2])).await.expect("save");
        store.save("beta", "citations", &json!([3])).await.expect("save");

        store.clear("alpha").await.expect("clear");

        assert!(store.load("alpha", "citations").await.is_none());
        assert!(store.load("alpha", "note_taking").await.is_none());
        assert!(store.load("beta", "citations").await.is_some());
    }

    #[tokio::test]
    async fn clear_on_missing_directory_is_ok() {
        let store = CheckpointStore::new("/nonexistent/surveyforge-test-dir", true);
        store.clear("topic").await.expect("clear is a no-op");
    }

    #[tokio::test]
    async fn disabled_store_never_saves_or_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), false);

        store.save("t", "citations", &json!([1])).await.expect("no-op save");
        assert!(store.load("t", "citations").await.is_none());
        assert!(
            std::fs::read_dir(dir.path()).expect("read dir").next().is_none(),
            "no files written"
        );
    }

    #[tokio::test]
    async fn stage_status_reports_list_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CheckpointStore::new(dir.path(), true);

        store
            .save("t", "literature_survey", &json!([1, 2, 3]))
            .await
            .expect("save");

        let status = store.stage_status("t", "literature_survey").await;
        assert!(status.completed);
        assert_eq!(status.data_size, 3);
        assert!(status.timestamp.is_some());

        let missing = store.stage_status("t", "note_taking").await;
        assert!(!missing.completed);
        assert_eq!(missing.data_size, 0);
    }
}

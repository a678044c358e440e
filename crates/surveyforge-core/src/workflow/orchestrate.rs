//! Workflow orchestrator: sequences the five stages with checkpointing,
//! retries, timeouts, and progress reporting.
//!
//! The orchestrator is stateless beyond the checkpoint store and the
//! caller's progress callback; concurrent invocations for different topics
//! are independent. Partial results are always returned; a failed run
//! keeps its checkpoints so the next run can resume.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{topic_slug, CheckpointStore};
use crate::config::Config;
use crate::llm::gateway::{GatewayConfig, LlmGateway};
use crate::llm::LlmProvider;
use crate::model::{Citation, Paper, ResearchNote, ResearchTheme};
use crate::ratelimit::SourceLimiters;
use crate::source::{SourceAdapter, SourceKind};
use crate::storage::ResearchStore;

use super::citations::{assemble_outputs, insert_inline_citations};
use super::draft::DraftInput;
use super::notes::NoteStageConfig;
use super::themes::ThemeStageConfig;
use super::{
    citations, draft, literature, notes, themes, Draft, StageName, WorkflowError, WorkflowOptions,
    WorkflowResult, WorkflowStatistics,
};

/// Soft ceiling on `max_papers` before a warning is logged.
const MAX_PAPERS_SOFT_LIMIT: usize = 200;

/// Default `max_papers` when the caller leaves it at 0.
const DEFAULT_MAX_PAPERS: usize = 100;

/// Completion status of one workflow step.
#[derive(Debug, Clone, Serialize)]
pub struct StepStatus {
    pub stage: String,
    pub completed: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub data_size: usize,
}

/// Checkpoint-derived status of a topic's workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub topic: String,
    pub steps: Vec<StepStatus>,
    /// Fraction of stages with a fresh checkpoint, 0-100.
    pub overall_progress: f64,
}

/// The research workflow: five stages from topic to draft.
pub struct Workflow {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    gateway: Arc<LlmGateway>,
    limiters: Arc<SourceLimiters>,
    checkpoints: CheckpointStore,
    store: Option<Arc<dyn ResearchStore>>,
    config: Config,
}

impl Workflow {
    /// Build a workflow from configuration, source adapters, and an LLM
    /// provider.
    pub fn new(
        config: Config,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        let gateway = Arc::new(LlmGateway::new(provider, GatewayConfig::from_config(&config)));
        let limiters = Arc::new(SourceLimiters::from_config(&config.rate_limits));
        let checkpoints = CheckpointStore::new(
            config.storage.cache_dir.clone(),
            config.research.checkpoint_enabled,
        );
        Self {
            adapters,
            gateway,
            limiters,
            checkpoints,
            store: None,
            config,
        }
    }

    /// Attach a persistent store; stages write entities as they produce them.
    pub fn with_store(mut self, store: Arc<dyn ResearchStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The gateway, for callers that want to share it or arm cooldowns.
    pub fn gateway(&self) -> &Arc<LlmGateway> {
        &self.gateway
    }

    /// Execute the full workflow for a topic.
    ///
    /// Never panics and never returns `Err`: every outcome, including
    /// validation failures and mid-stage errors, is a [`WorkflowResult`]
    /// carrying whatever partial data survived.
    pub async fn execute(&self, topic: &str, options: WorkflowOptions) -> WorkflowResult {
        let started = std::time::Instant::now();
        let mut state = RunState::default();

        if let Err(e) = validate_options(topic, &options) {
            let message = e.to_string();
            tracing::error!(error = %message, "workflow options rejected");
            emit(&options, 0, &format!("Error: {message}"));
            return state.into_result(topic, started, Some(message));
        }

        let resume = options.resume_from_checkpoint.unwrap_or(true);
        let cancel = options.cancel.clone().unwrap_or_default();
        let max_papers = if options.max_papers == 0 {
            DEFAULT_MAX_PAPERS
        } else {
            options.max_papers
        };
        if max_papers > MAX_PAPERS_SOFT_LIMIT {
            tracing::warn!(max_papers, "max_papers above soft limit, run may be slow");
        }
        let slug = topic_slug(topic);
        tracing::info!(topic = %topic, slug = %slug, resume, "starting research workflow");

        // ── Stage 1: literature survey ──────────────────────────────
        if resume {
            state.papers = self
                .load_checkpoint::<Vec<Paper>>(&slug, StageName::LiteratureSurvey)
                .await;
        }
        if state.papers.is_none() {
            let input = literature::LiteratureInput {
                topic: topic.to_string(),
                aspects: options.aspects.clone(),
                max_papers,
                date_from: options.date_from,
            };
            let outcome = self
                .run_stage(StageName::LiteratureSurvey, &cancel, || {
                    literature::execute(
                        &self.adapters,
                        &self.limiters,
                        self.store.as_deref(),
                        &cancel,
                        input.clone(),
                    )
                })
                .await;
            match outcome {
                Ok(papers) => {
                    self.save_checkpoint(&slug, StageName::LiteratureSurvey, &papers).await;
                    emit(&options, 1, &format!("Found {} relevant papers", papers.len()));
                    state.papers = Some(papers);
                }
                Err(e) => return self.fail(topic, started, state, e, &options).await,
            }
        }
        let papers = state.papers.clone().unwrap_or_default();

        // ── Stage 2: note taking ────────────────────────────────────
        if resume {
            state.notes = self
                .load_checkpoint::<Vec<ResearchNote>>(&slug, StageName::NoteTaking)
                .await;
        }
        if state.notes.is_none() {
            let note_config = NoteStageConfig {
                batch_size: self.config.research.batch_size,
                parallel: self.config.research.parallel_processing,
            };
            let outcome = self
                .run_stage(StageName::NoteTaking, &cancel, || {
                    notes::execute(
                        &self.gateway,
                        self.store.as_deref(),
                        &cancel,
                        &papers,
                        topic,
                        &note_config,
                    )
                })
                .await;
            match outcome {
                Ok(notes) => {
                    self.save_checkpoint(&slug, StageName::NoteTaking, &notes).await;
                    emit(&options, 2, &format!("Extracted {} research notes", notes.len()));
                    state.notes = Some(notes);
                }
                Err(e) => return self.fail(topic, started, state, e, &options).await,
            }
        }
        let run_notes = state.notes.clone().unwrap_or_default();

        // ── Stage 3: theme synthesis ────────────────────────────────
        if resume {
            if let Some(synthesis) = self
                .load_checkpoint::<ThemeSynthesisPayload>(&slug, StageName::ThemeSynthesis)
                .await
            {
                state.themes = Some(synthesis.themes);
                state.gaps = Some(synthesis.gaps);
            }
        }
        if state.themes.is_none() {
            let theme_config = ThemeStageConfig {
                min_cluster_size: self.config.research.min_cluster_size,
                similarity_threshold: self.config.research.similarity_threshold,
            };
            let outcome = self
                .run_stage(StageName::ThemeSynthesis, &cancel, || {
                    themes::execute(
                        &self.gateway,
                        self.store.as_deref(),
                        &cancel,
                        &run_notes,
                        &theme_config,
                    )
                })
                .await;
            match outcome {
                Ok((themes, gaps)) => {
                    let payload = ThemeSynthesisPayload {
                        themes: themes.clone(),
                        gaps: gaps.clone(),
                    };
                    self.save_checkpoint(&slug, StageName::ThemeSynthesis, &payload).await;
                    emit(&options, 3, &format!("Identified {} research themes", themes.len()));
                    state.themes = Some(themes);
                    state.gaps = Some(gaps);
                }
                Err(e) => return self.fail(topic, started, state, e, &options).await,
            }
        }
        let run_themes = state.themes.clone().unwrap_or_default();
        let run_gaps = state.gaps.clone().unwrap_or_default();

        // ── Stage 4: citations ──────────────────────────────────────
        if resume {
            state.citations = self
                .load_checkpoint::<Vec<Citation>>(&slug, StageName::Citations)
                .await;
        }
        if state.citations.is_none() {
            let doi_lookup = self.doi_lookup_adapter();
            let outcome = self
                .run_stage(StageName::Citations, &cancel, || {
                    citations::execute(doi_lookup, self.store.as_deref(), &cancel, &papers)
                })
                .await;
            match outcome {
                Ok(citations) => {
                    self.save_checkpoint(&slug, StageName::Citations, &citations).await;
                    emit(&options, 4, &format!("Generated {} citations", citations.len()));
                    state.citations = Some(citations);
                }
                Err(e) => return self.fail(topic, started, state, e, &options).await,
            }
        }
        let run_citations = state.citations.clone().unwrap_or_default();

        // ── Stage 5: draft writing ──────────────────────────────────
        if resume {
            state.draft = self
                .load_checkpoint::<Draft>(&slug, StageName::DraftWriting)
                .await;
        }
        if state.draft.is_none() {
            let input = DraftInput {
                topic: topic.to_string(),
                paper_type: options.paper_type,
                themes: run_themes.clone(),
                papers: papers.clone(),
                notes: run_notes.clone(),
                gaps: run_gaps.clone(),
            };
            let outcome = self
                .run_stage(StageName::DraftWriting, &cancel, || {
                    draft::execute(&self.gateway, &cancel, input.clone())
                })
                .await;
            match outcome {
                Ok(draft) => {
                    self.save_checkpoint(&slug, StageName::DraftWriting, &draft).await;
                    emit(&options, 5, "Composing academic paper draft...");
                    state.draft = Some(draft);
                }
                Err(e) => return self.fail(topic, started, state, e, &options).await,
            }
        }

        // ── Post-pass: inline citations, bibliography, report ───────
        let Some(mut final_draft) = state.draft.clone() else {
            let error = WorkflowError::StageFailed {
                stage: StageName::DraftWriting,
                message: "stage produced no draft".to_string(),
            };
            return self.fail(topic, started, state, error, &options).await;
        };
        for section in &mut final_draft.sections {
            section.content =
                insert_inline_citations(&section.content, &run_citations, &papers);
        }
        let (bibliography, report) = assemble_outputs(&run_citations, &papers);
        final_draft.bibliography = bibliography.clone();
        state.draft = Some(final_draft);

        if let Err(e) = self.checkpoints.clear(&slug).await {
            tracing::warn!(error = %e, "failed to clear checkpoints after success");
        }

        emit(&options, 5, "Research workflow completed successfully!");
        tracing::info!(
            elapsed_secs = started.elapsed().as_secs(),
            papers = papers.len(),
            "research workflow complete",
        );

        let mut result = state.into_result(topic, started, None);
        result.success = true;
        result.bibliography = bibliography;
        result.citation_report = report.to_text();
        result
    }

    /// Report per-stage completion from checkpoints.
    pub async fn get_workflow_status(&self, topic: &str) -> WorkflowStatus {
        let slug = topic_slug(topic);
        let mut steps = Vec::with_capacity(StageName::ALL.len());
        let mut completed = 0usize;

        for stage in StageName::ALL {
            let status = self.checkpoints.stage_status(&slug, stage.as_str()).await;
            if status.completed {
                completed += 1;
            }
            steps.push(StepStatus {
                stage: stage.as_str().to_string(),
                completed: status.completed,
                timestamp: status.timestamp,
                data_size: status.data_size,
            });
        }

        WorkflowStatus {
            topic: topic.to_string(),
            steps,
            overall_progress: completed as f64 / StageName::ALL.len() as f64 * 100.0,
        }
    }

    /// Remove a failed workflow's checkpoints so the next run starts clean.
    pub async fn cleanup_failed_workflow(&self, topic: &str) -> bool {
        let slug = topic_slug(topic);
        match self.checkpoints.clear(&slug).await {
            Ok(()) => {
                tracing::info!(topic = %topic, "cleaned up workflow checkpoints");
                true
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "workflow cleanup failed");
                false
            }
        }
    }

    /// Run one stage with timeout, retries, backoff, and cooldown feedback.
    async fn run_stage<T, F, Fut>(
        &self,
        stage: StageName,
        cancel: &CancellationToken,
        make: F,
    ) -> Result<T, WorkflowError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        let timeout = self.stage_timeout(stage);
        let attempts = self.config.research.max_retries + 1;
        let mut last_error: Option<WorkflowError> = None;

        for attempt in 0..attempts {
            tracing::info!(stage = %stage, attempt, "executing stage");
            let started = std::time::Instant::now();

            let outcome = match tokio::time::timeout(timeout, make()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(WorkflowError::StageTimeout {
                    stage,
                    seconds: timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(value) => {
                    tracing::info!(
                        stage = %stage,
                        elapsed_secs = started.elapsed().as_secs(),
                        "stage completed",
                    );
                    return Ok(value);
                }
                Err(e @ (WorkflowError::NoPapersFound
                | WorkflowError::Validation(_)
                | WorkflowError::Cancelled)) => {
                    // Terminal conditions retries cannot fix.
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(stage = %stage, attempt, error = %e, "stage attempt failed");
                    if e.is_api_class() {
                        self.gateway.trigger_cooldown().await;
                    }
                    let is_last = attempt + 1 == attempts;
                    last_error = Some(e);
                    if !is_last {
                        let backoff = stage_retry_backoff(attempt);
                        tokio::select! {
                            () = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                            () = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
        }

        let message = last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string());
        Err(WorkflowError::StageFailed { stage, message })
    }

    fn stage_timeout(&self, stage: StageName) -> Duration {
        Duration::from_secs(
            self.config
                .research
                .step_timeout_secs
                .min(stage.default_timeout_secs()),
        )
    }

    /// The adapter used for DOI enrichment (CrossRef when present).
    fn doi_lookup_adapter(&self) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.kind() == SourceKind::CrossRef)
            .map(|a| a.as_ref())
    }

    async fn load_checkpoint<T: serde::de::DeserializeOwned>(
        &self,
        slug: &str,
        stage: StageName,
    ) -> Option<T> {
        let value = self.checkpoints.load(slug, stage.as_str()).await?;
        match serde_json::from_value(value) {
            Ok(payload) => {
                tracing::info!(stage = %stage, "resuming from checkpoint");
                Some(payload)
            }
            Err(e) => {
                tracing::warn!(stage = %stage, error = %e, "checkpoint payload unusable, re-running stage");
                None
            }
        }
    }

    async fn save_checkpoint<T: Serialize>(&self, slug: &str, stage: StageName, payload: &T) {
        let value = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(stage = %stage, error = %e, "checkpoint serialization failed");
                return;
            }
        };
        if let Err(e) = self.checkpoints.save(slug, stage.as_str(), &value).await {
            tracing::warn!(stage = %stage, error = %e, "checkpoint save failed");
        }
    }

    /// Build the failure result: partial data, preserved checkpoints.
    async fn fail(
        &self,
        topic: &str,
        started: std::time::Instant,
        state: RunState,
        error: WorkflowError,
        options: &WorkflowOptions,
    ) -> WorkflowResult {
        let message = error.to_string();
        tracing::error!(topic = %topic, error = %message, "workflow failed");
        emit(options, 0, &format!("Error: {message}"));
        state.into_result(topic, started, Some(message))
    }
}

/// Accumulated stage outputs for one run.
#[derive(Default)]
struct RunState {
    papers: Option<Vec<Paper>>,
    notes: Option<Vec<ResearchNote>>,
    themes: Option<Vec<ResearchTheme>>,
    gaps: Option<Vec<String>>,
    citations: Option<Vec<Citation>>,
    draft: Option<Draft>,
}

impl RunState {
    fn into_result(
        self,
        topic: &str,
        started: std::time::Instant,
        error: Option<String>,
    ) -> WorkflowResult {
        let papers = self.papers.unwrap_or_default();
        let notes = self.notes.unwrap_or_default();
        let themes = self.themes.unwrap_or_default();
        let gaps = self.gaps.unwrap_or_default();
        let citations = self.citations.unwrap_or_default();

        WorkflowResult {
            success: false,
            research_topic: topic.to_string(),
            execution_time_secs: started.elapsed().as_secs_f64(),
            statistics: WorkflowStatistics {
                papers_found: papers.len(),
                notes_extracted: notes.len(),
                themes_identified: themes.len(),
                gaps_identified: gaps.len(),
                citations_generated: citations.len(),
            },
            papers,
            notes,
            themes,
            gaps,
            citations,
            draft: self.draft,
            bibliography: String::new(),
            citation_report: String::new(),
            error,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ThemeSynthesisPayload {
    themes: Vec<ResearchTheme>,
    gaps: Vec<String>,
}

fn validate_options(topic: &str, options: &WorkflowOptions) -> Result<(), WorkflowError> {
    if topic.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "research topic must not be empty".to_string(),
        ));
    }
    if options.max_papers != 0 && options.max_papers < 5 {
        return Err(WorkflowError::Validation(
            "max_papers must be at least 5".to_string(),
        ));
    }
    Ok(())
}

fn emit(options: &WorkflowOptions, step: u32, description: &str) {
    if let Some(callback) = &options.progress_callback {
        callback(step, description);
    }
}

/// Backoff between stage retries: 30s doubling per attempt, capped at 300s.
fn stage_retry_backoff(attempt: u32) -> Duration {
    let secs = 30u64.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_secs(secs.min(300))
}

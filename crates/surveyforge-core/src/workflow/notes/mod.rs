//! Note stage: batched per-paper extraction of sections and insights.
//!
//! Papers are processed in small batches with bounded intra-batch
//! parallelism and progressive pacing between batches. A paper that cannot
//! be processed still yields a minimal abstract note; paper-level problems
//! never fail the stage.

pub(crate) mod parser;

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::llm::gateway::LlmGateway;
use crate::llm::safety::Domain;
use crate::model::{NoteKind, Paper, ResearchNote};
use crate::storage::ResearchStore;

use super::WorkflowError;

/// Papers with less content than this get a single minimal note and no
/// LLM calls.
const MIN_CONTENT_CHARS: usize = 50;

/// Upper bounds on the content sent to the model per extraction call.
const SECTION_PROMPT_CHARS: usize = 8000;
const INSIGHT_PROMPT_CHARS: usize = 6000;

/// Workers per batch when parallel processing is enabled.
const MAX_BATCH_WORKERS: usize = 2;

/// Note stage tuning, derived from the workflow configuration.
#[derive(Debug, Clone)]
pub struct NoteStageConfig {
    /// Papers per batch.
    pub batch_size: usize,
    /// Process batch members concurrently.
    pub parallel: bool,
}

impl Default for NoteStageConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            parallel: true,
        }
    }
}

/// Execute the note stage over the ranked paper list.
pub async fn execute(
    gateway: &Arc<LlmGateway>,
    store: Option<&dyn ResearchStore>,
    cancel: &CancellationToken,
    papers: &[Paper],
    topic: &str,
    config: &NoteStageConfig,
) -> Result<Vec<ResearchNote>, WorkflowError> {
    let batch_size = config.batch_size.max(1);
    let total_batches = papers.len().div_ceil(batch_size);
    let mut all_notes = Vec::new();

    for (batch_index, batch) in papers.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        tracing::info!(
            batch = batch_index + 1,
            total_batches,
            papers = batch.len(),
            "processing note batch",
        );

        let batch_notes = if config.parallel && batch.len() > 1 {
            process_batch_parallel(gateway, cancel, batch, topic).await
        } else {
            let mut notes = Vec::new();
            for paper in batch {
                if cancel.is_cancelled() {
                    return Err(WorkflowError::Cancelled);
                }
                notes.extend(extract_paper_notes(gateway, paper, topic).await);
            }
            notes
        };

        if let Some(store) = store {
            for note in &batch_notes {
                if let Err(e) = store.save_note(note).await {
                    tracing::warn!(note_id = %note.id, error = %e, "note persistence failed");
                }
            }
        }
        all_notes.extend(batch_notes);

        // Progressive pacing between batches.
        if batch_index + 1 < total_batches {
            let pause = batch_pause(batch_index + 1);
            tracing::debug!(pause_secs = pause.as_secs(), "pausing between batches");
            tokio::select! {
                () = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                () = tokio::time::sleep(pause) => {}
            }
        }
    }

    tracing::info!(notes = all_notes.len(), papers = papers.len(), "note extraction complete");
    Ok(all_notes)
}

/// Process one batch with at most [`MAX_BATCH_WORKERS`] concurrent papers.
///
/// Output is re-ordered to batch order so note ordering is stable across
/// runs even though completion order is not.
async fn process_batch_parallel(
    gateway: &Arc<LlmGateway>,
    cancel: &CancellationToken,
    batch: &[Paper],
    topic: &str,
) -> Vec<ResearchNote> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(MAX_BATCH_WORKERS.min(batch.len())));
    let mut tasks: JoinSet<(usize, Vec<ResearchNote>)> = JoinSet::new();

    for (index, paper) in batch.iter().enumerate() {
        let gateway = Arc::clone(gateway);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let paper = paper.clone();
        let topic = topic.to_string();

        tasks.spawn(async move {
            let _permit = semaphore.acquire().await;
            if cancel.is_cancelled() {
                return (index, Vec::new());
            }
            let notes = extract_paper_notes(&gateway, &paper, &topic).await;
            (index, notes)
        });
    }

    let mut indexed: Vec<(usize, Vec<ResearchNote>)> = Vec::with_capacity(batch.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => indexed.push(entry),
            Err(e) => tracing::warn!(error = %e, "paper task panicked, skipping"),
        }
    }
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().flat_map(|(_, notes)| notes).collect()
}

/// Extract every note for one paper: six labeled sections plus 3-5 insights.
async fn extract_paper_notes(
    gateway: &Arc<LlmGateway>,
    paper: &Paper,
    topic: &str,
) -> Vec<ResearchNote> {
    let content = paper.content();
    if content.trim().chars().count() < MIN_CONTENT_CHARS {
        tracing::debug!(paper_id = %paper.id, "content too short, emitting minimal note");
        return vec![minimal_note(paper, topic)];
    }

    let created_at = Utc::now();
    let mut notes = Vec::new();
    let mut seq = 0usize;

    let section_out = gateway
        .generate(
            &section_prompt(paper, content),
            "You are an expert at parsing academic papers. Extract key sections \
             from the paper text. Be concise but comprehensive. If a section is \
             not clearly present, provide \"Not available\" as the value.",
            Domain::Generic,
        )
        .await;
    if !section_out.fallback {
        for (kind, section_content) in parser::parse_sections(&section_out.text) {
            notes.push(ResearchNote::new(
                &paper.id,
                seq,
                section_content,
                kind,
                0.7,
                created_at,
            ));
            seq += 1;
        }
    }

    let insight_out = gateway
        .generate(
            &insight_prompt(paper, content, topic),
            "You are an expert at identifying key insights from academic papers. \
             Focus on novel findings, important methodologies, and significant \
             conclusions. Be specific.",
            Domain::Generic,
        )
        .await;
    if !insight_out.fallback {
        for insight in parser::parse_insights(&insight_out.text) {
            notes.push(ResearchNote::new(
                &paper.id,
                seq,
                insight.content,
                insight.kind,
                insight.confidence,
                created_at,
            ));
            seq += 1;
        }
    }

    if notes.is_empty() {
        tracing::warn!(paper_id = %paper.id, "extraction yielded nothing, emitting minimal note");
        return vec![minimal_note(paper, topic)];
    }

    tracing::debug!(paper_id = %paper.id, count = notes.len(), "notes extracted");
    notes
}

fn minimal_note(paper: &Paper, topic: &str) -> ResearchNote {
    let content = if paper.abstract_text.trim().is_empty() {
        format!("Paper on {topic}: {}", paper.title)
    } else {
        paper.abstract_text.clone()
    };
    ResearchNote::new(&paper.id, 0, content, NoteKind::Abstract, 0.5, Utc::now())
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...[truncated]")
    }
}

fn section_prompt(paper: &Paper, content: &str) -> String {
    format!(
        "Paper Title: {title}\n\
         Paper Text: {text}\n\n\
         Extract and summarize these sections if present:\n\
         1. Abstract/Summary\n\
         2. Introduction/Background\n\
         3. Methodology/Methods\n\
         4. Key Findings/Results\n\
         5. Limitations\n\
         6. Future Work/Conclusions\n\n\
         Provide the response in this exact format:\n\
         ABSTRACT: [content or \"Not available\"]\n\
         INTRODUCTION: [content or \"Not available\"]\n\
         METHODOLOGY: [content or \"Not available\"]\n\
         FINDINGS: [content or \"Not available\"]\n\
         LIMITATIONS: [content or \"Not available\"]\n\
         FUTURE_WORK: [content or \"Not available\"]",
        title = paper.title,
        text = truncate_chars(content, SECTION_PROMPT_CHARS),
    )
}

fn insight_prompt(paper: &Paper, content: &str, topic: &str) -> String {
    format!(
        "Research Topic: {topic}\n\
         Paper Title: {title}\n\
         Paper Text: {text}\n\n\
         Identify 3-5 key insights from this paper relevant to the research \
         topic. For each insight, provide exactly this format:\n\n\
         INSIGHT_1:\n\
         CONTENT: [the insight or finding]\n\
         IMPORTANCE: [why it matters]\n\
         TYPE: [key_finding/methodology/limitation/future_work]\n\
         CONFIDENCE: [0.6-0.9]\n\n\
         Continue with INSIGHT_2, INSIGHT_3, and so on. Focus on quality over \
         quantity.",
        title = paper.title,
        text = truncate_chars(content, INSIGHT_PROMPT_CHARS),
    )
}

/// Progressive pause after the Nth batch (1-based), capped at six seconds.
fn batch_pause(batch_number: usize) -> std::time::Duration {
    std::time::Duration::from_secs(((batch_number as u64) * 2).min(6))
}

//! Literature stage: parallel fan-out to the bibliographic sources,
//! merge, dedup, and relevance ranking.
//!
//! One concurrent task per source, each guarded by its rate limiter and
//! retried on transient failures. A source failing all its retries is
//! isolated; the stage fails only when nothing at all was found.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::dedup;
use crate::error::SourceError;
use crate::model::Paper;
use crate::ratelimit::{CooldownClass, SourceLimiters};
use crate::source::SourceAdapter;
use crate::storage::ResearchStore;

use super::WorkflowError;

/// Retries per source after the initial attempt.
const SOURCE_RETRIES: u32 = 3;

/// Composite ranking weights: relevance, recency, citations.
const W_RELEVANCE: f64 = 0.5;
const W_RECENCY: f64 = 0.3;
const W_CITATIONS: f64 = 0.2;

/// Input for the literature stage.
#[derive(Debug, Clone)]
pub struct LiteratureInput {
    /// The research topic.
    pub topic: String,
    /// Specific aspects appended to the search query.
    pub aspects: Vec<String>,
    /// Papers to keep after dedup and ranking.
    pub max_papers: usize,
    /// Only papers published at or after this date.
    pub date_from: Option<DateTime<Utc>>,
}

impl LiteratureInput {
    fn query(&self) -> String {
        if self.aspects.is_empty() {
            self.topic.clone()
        } else {
            format!("{} {}", self.topic, self.aspects.join(" "))
        }
    }
}

/// Execute the literature stage: fan out, merge, dedup, rank, truncate.
pub async fn execute(
    adapters: &[Arc<dyn SourceAdapter>],
    limiters: &Arc<SourceLimiters>,
    store: Option<&dyn ResearchStore>,
    cancel: &CancellationToken,
    input: LiteratureInput,
) -> Result<Vec<Paper>, WorkflowError> {
    let query = input.query();
    tracing::info!(query = %query, max_papers = input.max_papers, "literature search starting");

    let mut tasks: JoinSet<Result<Vec<Paper>, SourceError>> = JoinSet::new();
    for adapter in adapters {
        let adapter = Arc::clone(adapter);
        let limiters = Arc::clone(limiters);
        let cancel = cancel.clone();
        let query = query.clone();
        let max_results = input.max_papers;
        let date_from = input.date_from;

        tasks.spawn(async move {
            search_with_retry(adapter.as_ref(), &limiters, &cancel, &query, max_results, date_from)
                .await
        });
    }

    let mut merged: Vec<Paper> = Vec::new();
    let mut failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(papers)) => merged.extend(papers),
            Ok(Err(e)) => {
                failures += 1;
                tracing::warn!(error = %e, "source task failed after retries");
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, "source task panicked");
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(WorkflowError::Cancelled);
    }

    tracing::info!(
        fetched = merged.len(),
        failed_sources = failures,
        "literature search complete",
    );

    let mut papers = dedup::dedup_papers(merged);
    if papers.is_empty() {
        return Err(WorkflowError::NoPapersFound);
    }

    rank_papers(&mut papers, &query);
    papers.truncate(input.max_papers);

    if let Some(store) = store {
        for paper in &papers {
            if let Err(e) = store.save_paper(paper).await {
                tracing::warn!(paper_id = %paper.id, error = %e, "paper persistence failed");
            }
        }
    }

    Ok(papers)
}

/// One source task: rate-limited search with retry and cooldown feedback.
async fn search_with_retry(
    adapter: &dyn SourceAdapter,
    limiters: &SourceLimiters,
    cancel: &CancellationToken,
    query: &str,
    max_results: usize,
    date_from: Option<DateTime<Utc>>,
) -> Result<Vec<Paper>, SourceError> {
    let kind = adapter.kind();
    let limiter = limiters.for_source(kind);

    for attempt in 0..=SOURCE_RETRIES {
        if cancel.is_cancelled() {
            return Err(SourceError::Unavailable {
                source_name: kind.as_str().to_string(),
                message: "cancelled".to_string(),
            });
        }

        limiter.acquire().await;

        match adapter.search(query, max_results, date_from).await {
            Ok(papers) => {
                tracing::debug!(source = %kind, count = papers.len(), attempt, "source search succeeded");
                return Ok(papers);
            }
            Err(e @ SourceError::InvalidResponse { .. }) => {
                // A malformed payload will not fix itself; don't retry.
                return Err(e);
            }
            Err(e) => {
                limiter.cooldown(CooldownClass::from(&e)).await;
                if attempt == SOURCE_RETRIES {
                    return Err(e);
                }
                let backoff = retry_backoff(attempt);
                tracing::warn!(
                    source = %kind,
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "source search failed, retrying",
                );
                tokio::select! {
                    () = cancel.cancelled() => {
                        return Err(SourceError::Unavailable {
                            source_name: kind.as_str().to_string(),
                            message: "cancelled".to_string(),
                        });
                    }
                    () = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    unreachable!("retry loop always returns")
}

/// Exponential backoff: 30s doubling per attempt, capped at 300s.
fn retry_backoff(attempt: u32) -> Duration {
    let secs = 30u64.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_secs(secs.min(300))
}

/// Rank papers in place by the composite score, descending.
///
/// Ties break on paper id so identical inputs produce identical order.
fn rank_papers(papers: &mut Vec<Paper>, query: &str) {
    let query_tokens = tokenize(query);
    let now_year = Utc::now().year();

    let mut scored: Vec<(f64, Paper)> = std::mem::take(papers)
        .into_iter()
        .map(|p| (composite_score(&p, &query_tokens, now_year), p))
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });
    *papers = scored.into_iter().map(|(_, p)| p).collect();
}

fn composite_score(paper: &Paper, query_tokens: &HashSet<String>, now_year: i32) -> f64 {
    W_RELEVANCE * relevance(paper, query_tokens)
        + W_RECENCY * recency(paper, now_year)
        + W_CITATIONS * citations_normalized(paper)
}

/// Fraction of query tokens appearing in the paper's title and abstract.
fn relevance(paper: &Paper, query_tokens: &HashSet<String>) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let doc = format!("{} {}", paper.title, paper.abstract_text);
    let doc_tokens = tokenize(&doc);
    let overlap = query_tokens.intersection(&doc_tokens).count();
    overlap as f64 / query_tokens.len() as f64
}

/// Exponential decay on publication age, 0 when the date is unknown.
fn recency(paper: &Paper, now_year: i32) -> f64 {
    match paper.year() {
        Some(year) => {
            let age = f64::from((now_year - year).max(0));
            (-age / 5.0).exp()
        }
        None => 0.0,
    }
}

fn citations_normalized(paper: &Paper) -> f64 {
    (f64::from(paper.citations) / 100.0).min(1.0)
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitsConfig;
    use crate::source::SourceKind;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn paper(id: &str, title: &str) -> Paper {
        Paper {
            id: id.to_string(),
            title: title.to_string(),
            authors: vec![format!("Author {id}")],
            abstract_text: String::new(),
            url: format!("https://example.org/{id}"),
            published_date: None,
            venue: None,
            citations: 0,
            doi: None,
            arxiv_id: None,
            keywords: vec![],
            full_text: None,
            source: None,
            created_at: Utc::now(),
        }
    }

    /// Adapter that fails `fail_times` before succeeding with fixed papers.
    struct FlakyAdapter {
        kind: SourceKind,
        fail_times: u32,
        calls: AtomicU32,
        papers: Vec<Paper>,
    }

    impl FlakyAdapter {
        fn healthy(kind: SourceKind, papers: Vec<Paper>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail_times: 0,
                calls: AtomicU32::new(0),
                papers,
            })
        }

        fn rate_limited(kind: SourceKind, fail_times: u32, papers: Vec<Paper>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail_times,
                calls: AtomicU32::new(0),
                papers,
            })
        }
    }

    #[async_trait::async_trait]
    impl SourceAdapter for FlakyAdapter {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
            _date_from: Option<DateTime<Utc>>,
        ) -> Result<Vec<Paper>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(SourceError::RateLimited {
                    source_name: self.kind.as_str().to_string(),
                    retry_after_secs: None,
                })
            } else {
                Ok(self.papers.clone())
            }
        }
    }

    /// Adapter that always fails with the given constructor.
    struct DeadAdapter {
        kind: SourceKind,
    }

    #[async_trait::async_trait]
    impl SourceAdapter for DeadAdapter {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
            _date_from: Option<DateTime<Utc>>,
        ) -> Result<Vec<Paper>, SourceError> {
            Err(SourceError::Unavailable {
                source_name: self.kind.as_str().to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    fn limiters() -> Arc<SourceLimiters> {
        // High rates so tests don't wait on pacing.
        Arc::new(SourceLimiters::from_config(&RateLimitsConfig {
            arxiv: 1000.0,
            openalex: 1000.0,
            crossref: 1000.0,
            min_delay_ms: 0,
        }))
    }

    fn input(max_papers: usize) -> LiteratureInput {
        LiteratureInput {
            topic: "vision transformers".to_string(),
            aspects: vec![],
            max_papers,
            date_from: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn merges_results_from_all_sources() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            FlakyAdapter::healthy(SourceKind::ArXiv, vec![paper("arxiv_1", "Vision One")]),
            FlakyAdapter::healthy(SourceKind::OpenAlex, vec![paper("openalex_1", "Vision Two")]),
            FlakyAdapter::healthy(SourceKind::CrossRef, vec![paper("crossref_1", "Vision Three")]),
        ];

        let papers = execute(
            &adapters,
            &limiters(),
            None,
            &CancellationToken::new(),
            input(30),
        )
        .await
        .expect("stage succeeds");

        assert_eq!(papers.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn one_dead_source_is_isolated() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(DeadAdapter {
                kind: SourceKind::ArXiv,
            }),
            FlakyAdapter::healthy(SourceKind::OpenAlex, vec![paper("openalex_1", "Vision Two")]),
            FlakyAdapter::healthy(SourceKind::CrossRef, vec![paper("crossref_1", "Vision Three")]),
        ];

        let papers = execute(
            &adapters,
            &limiters(),
            None,
            &CancellationToken::new(),
            input(30),
        )
        .await
        .expect("stage succeeds with two sources");

        assert_eq!(papers.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn all_sources_dead_is_no_papers_found() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(DeadAdapter {
                kind: SourceKind::ArXiv,
            }),
            Arc::new(DeadAdapter {
                kind: SourceKind::OpenAlex,
            }),
            Arc::new(DeadAdapter {
                kind: SourceKind::CrossRef,
            }),
        ];

        let err = execute(
            &adapters,
            &limiters(),
            None,
            &CancellationToken::new(),
            input(30),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WorkflowError::NoPapersFound));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_source_retries_then_succeeds() {
        let flaky =
            FlakyAdapter::rate_limited(SourceKind::OpenAlex, 2, vec![paper("openalex_1", "Hit")]);
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![flaky.clone()];

        let started = tokio::time::Instant::now();
        let papers = execute(
            &adapters,
            &limiters(),
            None,
            &CancellationToken::new(),
            input(10),
        )
        .await
        .expect("stage succeeds");

        assert_eq!(papers.len(), 1);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        // Two rate-limit cooldowns (15s each) plus retry backoffs (30s, 60s).
        assert!(started.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn result_truncated_to_max_papers() {
        let many: Vec<Paper> = (0..20)
            .map(|i| paper(&format!("arxiv_{i}"), &format!("Distinct Topic Number {i}")))
            .collect();
        let adapters: Vec<Arc<dyn SourceAdapter>> =
            vec![FlakyAdapter::healthy(SourceKind::ArXiv, many)];

        let papers = execute(
            &adapters,
            &limiters(),
            None,
            &CancellationToken::new(),
            input(5),
        )
        .await
        .expect("stage succeeds");

        assert_eq!(papers.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_across_sources_are_collapsed() {
        let mut a = paper("arxiv_2301.00001", "Robust Vision Transformers");
        a.arxiv_id = Some("2301.00001".to_string());
        let mut a2 = paper("openalex_W1", "ROBUST VISION TRANSFORMERS");
        a2.arxiv_id = Some("2301.00001".to_string());
        a2.abstract_text = "The longer abstract of the two records.".to_string();
        let mut b = paper("crossref_b", "A Different Molecular Study");
        b.doi = Some("10.1/xyz".to_string());

        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            FlakyAdapter::healthy(SourceKind::ArXiv, vec![a]),
            FlakyAdapter::healthy(SourceKind::OpenAlex, vec![a2]),
            FlakyAdapter::healthy(SourceKind::CrossRef, vec![b]),
        ];

        let papers = execute(
            &adapters,
            &limiters(),
            None,
            &CancellationToken::new(),
            input(30),
        )
        .await
        .expect("stage succeeds");

        assert_eq!(papers.len(), 2);
        let merged = papers
            .iter()
            .find(|p| p.arxiv_id.as_deref() == Some("2301.00001"))
            .expect("merged record");
        assert_eq!(merged.abstract_text, "The longer abstract of the two records.");
    }

    #[test]
    fn ranking_prefers_relevant_recent_cited() {
        let query_tokens = tokenize("vision transformers");
        let now_year = 2026;

        let mut relevant = paper("a", "Vision transformers at scale");
        relevant.published_date = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        relevant.citations = 80;

        let mut stale = paper("b", "Vision transformers history");
        stale.published_date = Some(Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap());
        stale.citations = 80;

        let mut off_topic = paper("c", "Molecular dynamics simulation");
        off_topic.published_date = Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        off_topic.citations = 80;

        let score_relevant = composite_score(&relevant, &query_tokens, now_year);
        let score_stale = composite_score(&stale, &query_tokens, now_year);
        let score_off = composite_score(&off_topic, &query_tokens, now_year);

        assert!(score_relevant > score_stale);
        assert!(score_relevant > score_off);
    }

    #[test]
    fn recency_is_zero_without_date() {
        assert!((recency(&paper("a", "t"), 2026)).abs() < f64::EPSILON);
    }

    #[test]
    fn citations_cap_at_one() {
        let mut p = paper("a", "t");
        p.citations = 10_000;
        assert!((citations_normalized(&p) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(0), Duration::from_secs(30));
        assert_eq!(retry_backoff(1), Duration::from_secs(60));
        assert_eq!(retry_backoff(2), Duration::from_secs(120));
        assert_eq!(retry_backoff(4), Duration::from_secs(300));
    }

    #[test]
    fn query_includes_aspects() {
        let input = LiteratureInput {
            topic: "vision transformers".to_string(),
            aspects: vec!["efficiency".to_string(), "robustness".to_string()],
            max_papers: 10,
            date_from: None,
        };
        assert_eq!(input.query(), "vision transformers efficiency robustness");
    }
}

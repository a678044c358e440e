//! Theme stage: keyword clustering over notes and theme synthesis.
//!
//! Clustering is greedy and incremental: each note joins the existing
//! cluster it is most similar to (average Jaccard over up to five cluster
//! representatives) or starts a new one. Clusters large enough are
//! synthesized into titled themes; gap identification runs over the full
//! note corpus afterwards.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::topic_slug;
use crate::llm::gateway::LlmGateway;
use crate::llm::safety::Domain;
use crate::model::{NoteKind, ResearchNote, ResearchTheme};
use crate::storage::ResearchStore;

use super::WorkflowError;

/// Cluster representatives compared against when placing a note.
const CLUSTER_SAMPLE: usize = 5;

/// Sample notes included in a synthesis prompt.
const SYNTHESIS_SAMPLE: usize = 8;

/// Maximum gaps reported.
const MAX_GAPS: usize = 7;

/// Research angles checked during gap identification.
const COMMON_ANGLES: [&str; 12] = [
    "longitudinal studies",
    "clinical trials",
    "real-world evidence",
    "cost-effectiveness",
    "patient outcomes",
    "implementation challenges",
    "regulatory considerations",
    "ethical implications",
    "scalability",
    "interoperability",
    "data quality",
    "bias mitigation",
];

/// Stopwords removed during keyword extraction: common English words plus
/// research-meta vocabulary that appears in every note.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "this", "that", "these", "those", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "do", "does", "did", "will", "would", "could", "should", "from", "they",
    "them", "their", "there", "where", "when", "what", "who", "how", "can", "may", "must",
    "shall", "not", "no", "yes", "also", "such", "very", "more", "most", "much", "many", "some",
    "any", "all", "each", "every", "other", "another", "first", "second", "third", "last",
    "next", "previous", "new", "old", "good", "bad", "great", "small", "large", "big", "little",
    "high", "low", "long", "short", "wide", "using", "used", "use", "based", "approach",
    "method", "technique", "methods", "results", "result", "conclusion", "conclusions", "study",
    "research", "paper", "work", "article", "analysis", "review", "survey", "overview",
    "summary",
];

/// Theme stage tuning, derived from the workflow configuration.
#[derive(Debug, Clone)]
pub struct ThemeStageConfig {
    /// Minimum notes per cluster for synthesis.
    pub min_cluster_size: usize,
    /// Average-Jaccard threshold for joining an existing cluster.
    pub similarity_threshold: f64,
}

impl Default for ThemeStageConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 3,
            similarity_threshold: 0.2,
        }
    }
}

/// A cluster of related notes with its generated label.
#[derive(Debug, Clone)]
pub struct NoteCluster {
    /// Label derived from the founding note's keywords and type.
    pub label: String,
    /// Member notes in placement order.
    pub notes: Vec<ResearchNote>,
}

/// Execute the theme stage: cluster, synthesize, identify gaps.
pub async fn execute(
    gateway: &Arc<LlmGateway>,
    store: Option<&dyn ResearchStore>,
    cancel: &CancellationToken,
    notes: &[ResearchNote],
    config: &ThemeStageConfig,
) -> Result<(Vec<ResearchTheme>, Vec<String>), WorkflowError> {
    if notes.is_empty() {
        tracing::warn!("no notes available for theme synthesis");
        return Ok((
            Vec::new(),
            vec!["No research notes available for analysis".to_string()],
        ));
    }

    let clusters = cluster_notes(notes, config.similarity_threshold);
    tracing::info!(clusters = clusters.len(), notes = notes.len(), "notes clustered");

    let mut themes = Vec::new();
    for cluster in &clusters {
        if cluster.notes.len() < config.min_cluster_size {
            tracing::debug!(
                label = %cluster.label,
                size = cluster.notes.len(),
                "cluster below minimum size, skipping",
            );
            continue;
        }
        if cancel.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        themes.push(synthesize_theme(gateway, cluster).await);
    }

    // When no cluster qualifies, group by note type instead.
    if themes.is_empty() {
        tracing::warn!("no cluster met the minimum size, grouping notes by type");
        themes = note_type_fallback_themes(notes, config.min_cluster_size);
    }

    if let Some(store) = store {
        for theme in &themes {
            if let Err(e) = store.save_theme(theme).await {
                tracing::warn!(theme_id = %theme.id, error = %e, "theme persistence failed");
            }
        }
    }

    let gaps = identify_gaps(&themes, notes);
    tracing::info!(themes = themes.len(), gaps = gaps.len(), "theme synthesis complete");

    Ok((themes, gaps))
}

/// Extract up to `max_keywords` keywords from text by frequency.
///
/// Lowercased alphabetic words of length >= 4 with stopwords removed; ties
/// break alphabetically so extraction is deterministic.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| w.len() >= 4 && !STOPWORDS.contains(w))
    {
        *counts.entry(word.to_string()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max_keywords).map(|(w, _)| w).collect()
}

/// Jaccard similarity between two notes' top-20 keyword sets.
pub fn note_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = extract_keywords(a, 20).into_iter().collect();
    let set_b: HashSet<String> = extract_keywords(b, 20).into_iter().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    intersection / union
}

/// Greedy incremental clustering in note order.
pub fn cluster_notes(notes: &[ResearchNote], similarity_threshold: f64) -> Vec<NoteCluster> {
    let mut clusters: Vec<NoteCluster> = Vec::new();

    for note in notes {
        let mut best: Option<(usize, f64)> = None;
        for (index, cluster) in clusters.iter().enumerate() {
            let sample = cluster.notes.iter().take(CLUSTER_SAMPLE);
            let mut total = 0.0;
            let mut count = 0usize;
            for member in sample {
                total += note_similarity(&note.content, &member.content);
                count += 1;
            }
            let average = if count == 0 { 0.0 } else { total / count as f64 };
            if average > similarity_threshold
                && best.map_or(true, |(_, best_avg)| average > best_avg)
            {
                best = Some((index, average));
            }
        }

        match best {
            Some((index, _)) => clusters[index].notes.push(note.clone()),
            None => {
                let keywords = extract_keywords(&note.content, 20);
                clusters.push(NoteCluster {
                    label: cluster_label(&keywords, note.note_type),
                    notes: vec![note.clone()],
                });
            }
        }
    }

    clusters
}

/// Cluster label from the founding note: top three keywords joined by `-`,
/// prefixed by the note type unless it is a key finding.
fn cluster_label(keywords: &[String], note_type: NoteKind) -> String {
    let core = if keywords.is_empty() {
        "general".to_string()
    } else {
        keywords.iter().take(3).cloned().collect::<Vec<_>>().join("-")
    };
    let label = if note_type == NoteKind::KeyFinding {
        core
    } else {
        format!("{}_{core}", note_type.as_str())
    };
    label.chars().take(50).collect()
}

fn synthesis_prompt(cluster: &NoteCluster) -> String {
    let samples = cluster
        .notes
        .iter()
        .take(SYNTHESIS_SAMPLE)
        .enumerate()
        .map(|(i, note)| {
            let preview: String = note.content.chars().take(150).collect();
            format!("{}. [{}] {preview}", i + 1, note.note_type)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Research Notes Cluster: {label}\n\
         Number of related notes: {count}\n\n\
         Sample Notes:\n{samples}\n\n\
         Create a research theme with:\n\
         TITLE: one clear, descriptive title (max 80 characters)\n\
         DESCRIPTION: the theme and its significance (max 150 words)\n\n\
         Focus on the main research concept these notes represent.",
        label = cluster.label.replace(['-', '_'], " "),
        count = cluster.notes.len(),
    )
}

/// Synthesize one theme from a qualifying cluster.
async fn synthesize_theme(gateway: &Arc<LlmGateway>, cluster: &NoteCluster) -> ResearchTheme {
    let output = gateway
        .generate(
            &synthesis_prompt(cluster),
            "You are an expert research analyst. Create a concise research theme \
             from the provided notes. Identify the main concept, key patterns, \
             and research significance.",
            Domain::Generic,
        )
        .await;

    let (title, description) = if output.fallback {
        fallback_title_description(cluster)
    } else {
        let title = extract_field(&output.text, "TITLE");
        let description = extract_field(&output.text, "DESCRIPTION");
        match (title, description) {
            (Some(t), Some(d)) => (t, d),
            (Some(t), None) => {
                let d = format!(
                    "Research theme focusing on {}. Based on analysis of {} related research notes.",
                    t.to_lowercase(),
                    cluster.notes.len()
                );
                (t, d)
            }
            _ => fallback_title_description(cluster),
        }
    };

    build_theme(cluster, title, description)
}

fn build_theme(cluster: &NoteCluster, title: String, description: String) -> ResearchTheme {
    let papers: BTreeSet<String> = cluster
        .notes
        .iter()
        .map(|n| n.paper_id.clone())
        .collect();
    let confidence = (0.4 + 0.05 * cluster.notes.len() as f64).min(0.9);

    ResearchTheme {
        id: format!("theme:{}", topic_slug(&cluster.label)),
        title,
        description,
        papers: papers.into_iter().collect(),
        frequency: cluster.notes.len(),
        confidence,
        related_themes: Vec::new(),
        created_at: Utc::now(),
    }
    .enforce_limits()
}

/// Title and description derived from cluster keywords when synthesis
/// fails or parsing misses.
fn fallback_title_description(cluster: &NoteCluster) -> (String, String) {
    let combined: String = cluster
        .notes
        .iter()
        .take(10)
        .map(|n| n.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let keywords = extract_keywords(&combined, 5);

    let title = if keywords.is_empty() {
        titleize(&cluster.label.replace(['-', '_'], " "))
    } else {
        format!(
            "{} Research",
            titleize(&keywords.iter().take(3).cloned().collect::<Vec<_>>().join(" "))
        )
    };

    let mut description = format!(
        "Research theme focusing on {}. This theme emerges from analysis of {} research notes",
        title.to_lowercase(),
        cluster.notes.len()
    );
    if keywords.is_empty() {
        description.push_str(" across multiple research papers.");
    } else {
        description.push_str(&format!(
            " covering topics related to {}.",
            keywords.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        ));
    }

    (title, description)
}

fn titleize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Group all notes by note type and emit a theme per type with enough notes.
fn note_type_fallback_themes(
    notes: &[ResearchNote],
    min_cluster_size: usize,
) -> Vec<ResearchTheme> {
    let mut by_type: Vec<(NoteKind, Vec<ResearchNote>)> = Vec::new();
    for note in notes {
        match by_type.iter_mut().find(|(kind, _)| *kind == note.note_type) {
            Some((_, members)) => members.push(note.clone()),
            None => by_type.push((note.note_type, vec![note.clone()])),
        }
    }

    by_type
        .into_iter()
        .filter(|(_, members)| members.len() >= min_cluster_size)
        .map(|(kind, members)| {
            let cluster = NoteCluster {
                label: format!("{}_notes", kind.as_str()),
                notes: members,
            };
            let (title, description) = fallback_title_description(&cluster);
            build_theme(&cluster, title, description)
        })
        .collect()
}

/// Extract a `FIELD: value` line from LLM output.
fn extract_field(text: &str, field: &str) -> Option<String> {
    let patterns = [
        format!(r"(?is){field}:\s*(.+?)(?=\n[A-Z]+:|\z)"),
        format!(r"(?is)\*\*{field}\*\*:?\s*(.+?)(?=\n|\z)"),
    ];
    for pattern in patterns {
        let re = regex::Regex::new(&pattern).expect("static pattern");
        if let Some(captures) = re.captures(text) {
            let value = captures[1]
                .trim()
                .trim_matches(|c: char| c == '*' || c == '-')
                .trim()
                .to_string();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Identify research gaps from the themes and the full note corpus.
pub fn identify_gaps(themes: &[ResearchTheme], notes: &[ResearchNote]) -> Vec<String> {
    if themes.is_empty() {
        return vec![
            "Limited research themes identified - more comprehensive analysis needed".to_string(),
        ];
    }

    let corpus: String = notes
        .iter()
        .take(50)
        .map(|n| n.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let mut gaps = Vec::new();
    for angle in COMMON_ANGLES {
        if !corpus.contains(angle) {
            gaps.push(format!("Limited research on {angle} in the current literature"));
        }
    }

    if themes.len() < 3 {
        gaps.push(
            "Limited diversity in research themes - broader investigation needed".to_string(),
        );
    }

    if themes.iter().any(|t| t.confidence < 0.6) {
        gaps.push(
            "Several research areas show low confidence, indicating need for more \
             comprehensive studies"
                .to_string(),
        );
    }

    gaps.truncate(MAX_GAPS);
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::gateway::GatewayConfig;
    use crate::llm::{FinishReason, GenerationParams, LlmProvider, LlmResponse, TokenUsage};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct ScriptedProvider {
        script: StdMutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into_iter().map(String::from).collect()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _system: &str,
            _user: &str,
            _params: &GenerationParams,
        ) -> Result<LlmResponse, LlmError> {
            let mut script = self.script.lock().unwrap();
            let text = if script.is_empty() {
                String::new()
            } else {
                script.remove(0)
            };
            let finish_reason = if text.is_empty() {
                FinishReason::Safety
            } else {
                FinishReason::Stop
            };
            Ok(LlmResponse {
                text,
                finish_reason,
                usage: TokenUsage::default(),
                model: "test".to_string(),
            })
        }
    }

    fn gateway(script: Vec<&str>) -> Arc<LlmGateway> {
        Arc::new(LlmGateway::new(
            ScriptedProvider::new(script),
            GatewayConfig {
                min_request_interval: Duration::from_millis(0),
                ..GatewayConfig::default()
            },
        ))
    }

    fn note(paper_id: &str, seq: usize, content: &str, kind: NoteKind) -> ResearchNote {
        ResearchNote::new(paper_id, seq, content, kind, 0.7, Utc::now())
    }

    fn pruning_notes() -> Vec<ResearchNote> {
        vec![
            note("p1", 0, "Transformer pruning sparsity accuracy tradeoff evaluated", NoteKind::KeyFinding),
            note("p2", 0, "Pruning transformer layers retains accuracy under sparsity", NoteKind::KeyFinding),
            note("p3", 0, "Sparsity schedules improve transformer pruning accuracy", NoteKind::KeyFinding),
        ]
    }

    #[test]
    fn keywords_filter_stopwords_and_short_words(){
        let keywords = extract_keywords(
            "The results of this study show that transformer models use attention",
            10,
        );
        assert!(keywords.contains(&"transformer".to_string()));
        assert!(keywords.contains(&"attention".to_string()));
        assert!(!keywords.contains(&"results".to_string()), "research-meta stopword");
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"use".to_string()), "below length threshold");
    }

    #[test]
    fn keywords_ranked_by_frequency_then_alphabetical() {
        let keywords = extract_keywords("zebra apple zebra apple zebra banana", 3);
        assert_eq!(keywords, vec!["zebra", "apple", "banana"]);
    }

    #[test]
    fn similarity_of_related_notes_is_high() {
        let a = "Transformer pruning sparsity accuracy tradeoff";
        let b = "Pruning transformer sparsity keeps accuracy";
        assert!(note_similarity(a, b) > 0.2);
        assert!(note_similarity(a, "Enzyme kinetics in yeast cells") < 0.05);
    }

    #[test]
    fn clustering_groups_similar_notes() {
        let mut notes = pruning_notes();
        notes.push(note("p4", 0, "Enzyme kinetics in yeast metabolism pathways", NoteKind::KeyFinding));

        let clusters = cluster_notes(&notes, 0.2);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].notes.len(), 3);
        assert_eq!(clusters[1].notes.len(), 1);
    }

    #[test]
    fn cluster_label_includes_type_prefix_for_sections() {
        let label = cluster_label(
            &["pruning".to_string(), "sparsity".to_string(), "accuracy".to_string()],
            NoteKind::Methodology,
        );
        assert_eq!(label, "methodology_pruning-sparsity-accuracy");

        let label = cluster_label(&["pruning".to_string()], NoteKind::KeyFinding);
        assert_eq!(label, "pruning");
    }

    #[tokio::test(start_paused = true)]
    async fn synthesizes_theme_from_llm_fields() {
        let gateway = gateway(vec![
            "TITLE: Transformer Pruning Under Sparsity\nDESCRIPTION: Pruning strategies keep accuracy while removing weights across transformer scales.",
        ]);

        let (themes, _gaps) = execute(
            &gateway,
            None,
            &CancellationToken::new(),
            &pruning_notes(),
            &ThemeStageConfig::default(),
        )
        .await
        .expect("stage succeeds");

        assert_eq!(themes.len(), 1);
        let theme = &themes[0];
        assert_eq!(theme.title, "Transformer Pruning Under Sparsity");
        assert_eq!(theme.frequency, 3);
        assert_eq!(theme.papers.len(), 3);
        assert!((theme.confidence - 0.55).abs() < 1e-9, "0.4 + 3*0.05");
    }

    #[tokio::test(start_paused = true)]
    async fn parse_failure_uses_keyword_fallback() {
        let gateway = gateway(vec![
            "Here is a long response that does not follow the requested format at all.",
        ]);

        let (themes, _gaps) = execute(
            &gateway,
            None,
            &CancellationToken::new(),
            &pruning_notes(),
            &ThemeStageConfig::default(),
        )
        .await
        .expect("stage succeeds");

        assert_eq!(themes.len(), 1);
        assert!(themes[0].title.ends_with("Research"));
        assert!(!themes[0].description.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn small_clusters_fall_back_to_note_type_grouping() {
        // Three dissimilar notes of the same type: no cluster reaches size
        // 3, but the note-type fallback does.
        let notes = vec![
            note("p1", 0, "Enzyme kinetics in yeast metabolism measured", NoteKind::Findings),
            note("p2", 0, "Quantum error correction codes for qubits", NoteKind::Findings),
            note("p3", 0, "Urban traffic congestion pricing policies", NoteKind::Findings),
        ];
        let gateway = gateway(vec![]);

        let (themes, _gaps) = execute(
            &gateway,
            None,
            &CancellationToken::new(),
            &notes,
            &ThemeStageConfig::default(),
        )
        .await
        .expect("stage succeeds");

        assert_eq!(themes.len(), 1);
        assert_eq!(themes[0].frequency, 3);
        assert_eq!(themes[0].id, "theme:findings_notes");
    }

    #[tokio::test(start_paused = true)]
    async fn no_notes_reports_gap_only() {
        let gateway = gateway(vec![]);
        let (themes, gaps) = execute(
            &gateway,
            None,
            &CancellationToken::new(),
            &[],
            &ThemeStageConfig::default(),
        )
        .await
        .expect("stage succeeds");

        assert!(themes.is_empty());
        assert_eq!(gaps.len(), 1);
    }

    #[test]
    fn gaps_report_missing_angles_capped_at_seven() {
        let themes = vec![ResearchTheme {
            id: "theme:x".to_string(),
            title: "X".to_string(),
            description: "D".to_string(),
            papers: vec!["p1".to_string()],
            frequency: 3,
            confidence: 0.8,
            related_themes: vec![],
            created_at: Utc::now(),
        }];
        let notes = pruning_notes();

        let gaps = identify_gaps(&themes, &notes);
        assert_eq!(gaps.len(), MAX_GAPS);
        assert!(gaps[0].starts_with("Limited research on"));
    }

    #[test]
    fn gaps_mention_covered_angles_only_when_absent() {
        let themes = vec![ResearchTheme {
            id: "theme:x".to_string(),
            title: "X".to_string(),
            description: "D".to_string(),
            papers: vec![],
            frequency: 3,
            confidence: 0.9,
            related_themes: vec![],
            created_at: Utc::now(),
        }];
        let notes = vec![note(
            "p1",
            0,
            "We ran longitudinal studies with cost-effectiveness analysis",
            NoteKind::Findings,
        )];

        let gaps = identify_gaps(&themes, &notes);
        assert!(!gaps.iter().any(|g| g.contains("longitudinal studies")));
        assert!(!gaps.iter().any(|g| g.contains("cost-effectiveness")));
    }

    #[test]
    fn extract_field_handles_markdown_variants() {
        assert_eq!(
            extract_field("TITLE: Plain Title\nDESCRIPTION: D", "TITLE"),
            Some("Plain Title".to_string())
        );
        assert_eq!(
            extract_field("**TITLE**: Bold Title\nrest", "TITLE"),
            Some("Bold Title".to_string())
        );
        assert_eq!(extract_field("no fields here", "TITLE"), None);
    }
}

//! Draft stage: domain detection and section-by-section prose generation.
//!
//! Sections are generated in document order through the gateway. Every
//! generated section is validated against the domain's unsafe-content
//! patterns; a violation (or an exhausted gateway) substitutes the domain
//! fallback template and is recorded in the draft metadata.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::llm::gateway::LlmGateway;
use crate::llm::safety::{self, Domain, SectionKind};
use crate::model::{Paper, ResearchNote, ResearchTheme};

use super::{Draft, DraftMetadata, PaperType, ThemeSection, WorkflowError};

/// Themes given their own body section.
const MAX_THEME_SECTIONS: usize = 5;

/// Input for the draft stage.
#[derive(Debug, Clone)]
pub struct DraftInput {
    pub topic: String,
    pub paper_type: PaperType,
    pub themes: Vec<ResearchTheme>,
    pub papers: Vec<Paper>,
    pub notes: Vec<ResearchNote>,
    pub gaps: Vec<String>,
}

/// Execute the draft stage.
pub async fn execute(
    gateway: &Arc<LlmGateway>,
    cancel: &CancellationToken,
    input: DraftInput,
) -> Result<Draft, WorkflowError> {
    let domain = safety::detect_domain(&input.topic, &input.papers);
    tracing::info!(domain = %domain, topic = %input.topic, "drafting with detected domain");

    let mut log = Vec::new();
    let mut fallback_sections = Vec::new();

    let abstract_text = generate_section(
        gateway,
        cancel,
        domain,
        "abstract",
        SectionKind::Abstract,
        &abstract_prompt(&input, domain),
        &mut log,
        &mut fallback_sections,
    )
    .await?;

    let introduction = generate_section(
        gateway,
        cancel,
        domain,
        "introduction",
        SectionKind::Introduction,
        &introduction_prompt(&input, domain),
        &mut log,
        &mut fallback_sections,
    )
    .await?;

    let mut sections = Vec::new();
    for (index, theme) in input.themes.iter().take(MAX_THEME_SECTIONS).enumerate() {
        let key = format!("theme_{}", index + 1);
        let content = generate_section(
            gateway,
            cancel,
            domain,
            &key,
            SectionKind::Theme,
            &theme_prompt(&input, theme, domain),
            &mut log,
            &mut fallback_sections,
        )
        .await?;
        sections.push(ThemeSection {
            key,
            title: theme.title.clone(),
            content,
        });
    }

    let discussion = generate_section(
        gateway,
        cancel,
        domain,
        "discussion",
        SectionKind::Discussion,
        &discussion_prompt(&input, domain),
        &mut log,
        &mut fallback_sections,
    )
    .await?;

    let conclusion = generate_section(
        gateway,
        cancel,
        domain,
        "conclusion",
        SectionKind::Conclusion,
        &conclusion_prompt(&input, domain),
        &mut log,
        &mut fallback_sections,
    )
    .await?;

    tracing::info!(
        sections = sections.len() + 4,
        fallbacks = fallback_sections.len(),
        "draft compiled",
    );

    Ok(Draft {
        title: format!("{} {}", input.paper_type.title_prefix(), input.topic),
        abstract_text,
        introduction,
        sections,
        discussion,
        conclusion,
        bibliography: String::new(),
        metadata: DraftMetadata {
            domain,
            generation_log: log,
            safety_validated: true,
            fallback_sections,
            themes_count: input.themes.len(),
            papers_count: input.papers.len(),
            gaps_count: input.gaps.len(),
        },
    })
}

/// Generate one section, applying safety validation and fallback recording.
#[allow(clippy::too_many_arguments)]
async fn generate_section(
    gateway: &Arc<LlmGateway>,
    cancel: &CancellationToken,
    domain: Domain,
    key: &str,
    kind: SectionKind,
    prompt: &str,
    log: &mut Vec<String>,
    fallback_sections: &mut Vec<String>,
) -> Result<String, WorkflowError> {
    if cancel.is_cancelled() {
        return Err(WorkflowError::Cancelled);
    }

    let system = format!(
        "You are a professional academic writing assistant specializing in \
         {domain} research. Provide only educational, scholarly content \
         suitable for academic publication.",
    );
    let output = gateway.generate(prompt, &system, domain).await;

    if output.fallback {
        log.push(format!("{key}: fallback"));
        fallback_sections.push(key.to_string());
        return Ok(output.text);
    }

    if !safety::validate_content_safety(&output.text, domain) {
        tracing::warn!(section = key, "generated section failed safety validation");
        log.push(format!("{key}: fallback (unsafe content)"));
        fallback_sections.push(key.to_string());
        return Ok(safety::fallback_content(domain, kind));
    }

    log.push(format!("{key}: success ({} attempts)", output.attempts));
    Ok(output.text)
}

fn themes_brief(input: &DraftInput) -> String {
    input
        .themes
        .iter()
        .take(5)
        .map(|t| t.title.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

fn gaps_brief(input: &DraftInput) -> String {
    if input.gaps.is_empty() {
        "several areas for future work".to_string()
    } else {
        input.gaps.iter().take(3).cloned().collect::<Vec<_>>().join("; ")
    }
}

fn abstract_prompt(input: &DraftInput, domain: Domain) -> String {
    format!(
        "Research Topic: {topic}\n\
         Research Domain: {domain}\n\
         Key Themes: {themes}\n\
         Research Areas: {gaps}\n\n\
         Write a 150-200 word academic abstract for a {domain} literature \
         survey covering the topic introduction, survey scope, key findings \
         and themes, and implications for future research.",
        topic = input.topic,
        themes = themes_brief(input),
        gaps = gaps_brief(input),
    )
}

fn introduction_prompt(input: &DraftInput, domain: Domain) -> String {
    format!(
        "Research Topic: {topic}\n\
         Research Domain: {domain}\n\
         Number of Papers Surveyed: {papers}\n\n\
         Write a 300-400 word introduction that establishes the importance of \
         the topic, provides context and motivation, outlines the survey \
         scope, and gives a roadmap of the paper.",
        topic = input.topic,
        papers = input.papers.len(),
    )
}

fn theme_prompt(input: &DraftInput, theme: &ResearchTheme, domain: Domain) -> String {
    let theme_papers: Vec<&Paper> = input
        .papers
        .iter()
        .filter(|p| theme.papers.contains(&p.id))
        .take(5)
        .collect();
    let papers_info = theme_papers
        .iter()
        .map(|p| {
            format!(
                "- {} by {}",
                p.title,
                p.authors.first().map_or("Unknown", String::as_str)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let key_notes = input
        .notes
        .iter()
        .filter(|n| theme.papers.contains(&n.paper_id))
        .take(5)
        .map(|n| format!("- {}", truncate(&n.content, 100)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Research Domain: {domain}\n\
         Theme: {title}\n\
         Description: {description}\n\n\
         Related Papers:\n{papers_info}\n\n\
         Key Findings:\n{key_notes}\n\n\
         Write a 400-500 word academic section that introduces the theme, \
         discusses key contributions from the literature, synthesizes \
         findings across papers, and notes differing results. Indicate where \
         citations belong with [Citation].",
        title = theme.title,
        description = theme.description,
    )
}

fn discussion_prompt(input: &DraftInput, domain: Domain) -> String {
    let themes_summary = input
        .themes
        .iter()
        .map(|t| format!("- {}: {}", t.title, truncate(&t.description, 100)))
        .collect::<Vec<_>>()
        .join("\n");
    let gaps_list = if input.gaps.is_empty() {
        "- Several areas for future investigation".to_string()
    } else {
        input
            .gaps
            .iter()
            .take(5)
            .map(|g| format!("- {g}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Research Domain: {domain}\n\
         Research Themes Identified:\n{themes_summary}\n\n\
         Research Areas:\n{gaps_list}\n\n\
         Write a 500-600 word discussion that synthesizes the main findings \
         across themes, discusses implications for the field, addresses open \
         research areas, and suggests future directions.",
    )
}

fn conclusion_prompt(input: &DraftInput, domain: Domain) -> String {
    format!(
        "Research Topic: {topic}\n\
         Research Domain: {domain}\n\
         Number of Themes: {themes}\n\
         Number of Areas Identified: {gaps}\n\n\
         Write a 200-300 word conclusion that summarizes the survey's \
         contributions, highlights key insights, and provides clear future \
         research directions.",
        topic = input.topic,
        themes = input.themes.len(),
        gaps = input.gaps.len(),
    )
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

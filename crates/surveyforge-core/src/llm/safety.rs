//! Domain-aware prompt shaping for safety-filtered providers.
//!
//! Remote academic-content generation trips provider safety filters on
//! ordinary scholarly vocabulary ("attack", "injection", "kill" in a
//! medical dosage context). This module rewrites prompts before they are
//! sent: whole-word domain-specific substitutions, a universal substitution
//! pass, an academic-context preamble, and formatting normalization.
//! Everything here is a pure function over fixed tables.

use regex::Regex;

use crate::model::Paper;

/// Research-area tag used to choose safety rewrites and fallback prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    AiMl,
    Biology,
    Chemistry,
    ComputerScience,
    Cybersecurity,
    Economics,
    Engineering,
    Generic,
    Medical,
    Physics,
    Psychology,
}

impl Domain {
    /// Every domain with a detection keyword list, in alphabetical label
    /// order. `Generic` is absent: it is the no-signal default, never scored.
    const DETECTABLE: [Domain; 10] = [
        Domain::AiMl,
        Domain::Biology,
        Domain::Chemistry,
        Domain::ComputerScience,
        Domain::Cybersecurity,
        Domain::Economics,
        Domain::Engineering,
        Domain::Medical,
        Domain::Physics,
        Domain::Psychology,
    ];

    /// Stable snake_case label, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Domain::AiMl => "ai_ml",
            Domain::Biology => "biology",
            Domain::Chemistry => "chemistry",
            Domain::ComputerScience => "computer_science",
            Domain::Cybersecurity => "cybersecurity",
            Domain::Economics => "economics",
            Domain::Engineering => "engineering",
            Domain::Generic => "generic",
            Domain::Medical => "medical",
            Domain::Physics => "physics",
            Domain::Psychology => "psychology",
        }
    }

    /// The academic context named in the prompt preamble.
    fn safe_context(self) -> &'static str {
        match self {
            Domain::AiMl => "machine learning research",
            Domain::Biology => "biological research",
            Domain::Chemistry => "chemical research",
            Domain::ComputerScience => "computing research",
            Domain::Cybersecurity => "security research",
            Domain::Economics => "economic research",
            Domain::Engineering => "engineering research",
            Domain::Generic => "academic research",
            Domain::Medical => "medical research",
            Domain::Physics => "physics research",
            Domain::Psychology => "psychological research",
        }
    }

    /// Whole-word substitutions applied for this domain before the
    /// universal pass.
    fn replacements(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Domain::Cybersecurity => &[
                ("attack", "security analysis"),
                ("exploit", "vulnerability assessment"),
                ("penetration", "security testing"),
                ("injection", "input validation"),
                ("malware", "malicious software"),
                ("hack", "security modification"),
                ("breach", "security incident"),
                ("threat", "security challenge"),
                ("payload", "data packet"),
                ("backdoor", "unauthorized access point"),
            ],
            Domain::Medical => &[
                ("kill", "eliminate"),
                ("toxic", "harmful"),
                ("poison", "contaminate"),
                ("virus", "pathogen"),
                ("infection", "contamination"),
                ("disease", "medical condition"),
                ("death", "mortality"),
                ("pain", "discomfort"),
            ],
            Domain::AiMl => &[
                ("adversarial", "challenging"),
                ("attack", "perturbation"),
                ("poisoning", "data contamination"),
                ("manipulation", "data modification"),
                ("deception", "misclassification"),
            ],
            Domain::Chemistry => &[
                ("explosive", "reactive compound"),
                ("toxic", "hazardous"),
                ("poison", "harmful substance"),
                ("bomb", "explosive device"),
                ("weapon", "chemical agent"),
            ],
            Domain::Biology => &[
                ("kill", "inhibit"),
                ("death", "cell death"),
                ("virus", "viral agent"),
                ("infection", "biological process"),
                ("parasite", "parasitic organism"),
            ],
            _ => &[
                ("attack", "approach"),
                ("exploit", "utilize"),
                ("vulnerability", "limitation"),
                ("threat", "challenge"),
                ("weapon", "tool"),
                ("kill", "terminate"),
                ("hack", "modify"),
            ],
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Universal substitutions applied after the domain pass.
const UNIVERSAL_REPLACEMENTS: &[(&str, &str)] = &[
    ("destroying", "analyzing"),
    ("eliminating", "removing"),
    ("targeting", "focusing on"),
    ("defeating", "overcoming"),
    ("crushing", "comprehensive analysis of"),
    ("dominating", "leading in"),
    ("conquering", "mastering"),
    ("annihilating", "thoroughly examining"),
];

/// Imperative-to-analytical verb rewrites for the ultra-safe prompt variant.
const ANALYTICAL_REPLACEMENTS: &[(&str, &str)] = &[
    ("write", "analyze"),
    ("create", "analyze"),
    ("generate", "analyze"),
    ("discuss", "review"),
    ("examine", "review"),
    ("explore", "review"),
];

fn replace_whole_word(text: &str, word: &str, replacement: &str) -> String {
    let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
    // Table entries are static and known-valid patterns.
    let re = Regex::new(&pattern).expect("static replacement pattern");
    re.replace_all(text, replacement).into_owned()
}

fn apply_replacements(text: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = text.to_string();
    for (word, replacement) in pairs {
        out = replace_whole_word(&out, word, replacement);
    }
    out
}

/// Normalize shouting and repeated punctuation: runs of four or more
/// capitals are title-cased, repeated `!` and `?` collapse to one.
fn normalize_formatting(text: &str) -> String {
    let caps = Regex::new(r"[A-Z]{4,}").expect("static pattern");
    let out = caps
        .replace_all(text, |c: &regex::Captures<'_>| title_case(&c[0]))
        .into_owned();
    let bangs = Regex::new(r"!{2,}").expect("static pattern");
    let out = bangs.replace_all(&out, "!").into_owned();
    let questions = Regex::new(r"\?{2,}").expect("static pattern");
    questions.replace_all(&out, "?").into_owned()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Apply the domain table, the universal table, and formatting
/// normalization to a prompt fragment.
pub fn sanitize_for_domain(text: &str, domain: Domain) -> String {
    let out = apply_replacements(text, domain.replacements());
    let out = apply_replacements(&out, UNIVERSAL_REPLACEMENTS);
    normalize_formatting(&out)
}

/// The full safety-shaped prompt: academic preamble plus sanitized body.
pub fn shape_prompt(prompt: &str, domain: Domain) -> String {
    format!(
        "ACADEMIC RESEARCH CONTEXT: This content is for {context}. \
         Provide a scholarly, professional response focused on academic \
         analysis and research methodology.\n\n{body}",
        context = domain.safe_context(),
        body = sanitize_for_domain(prompt, domain),
    )
}

/// The second-attempt prompt variant: imperative verbs rewritten to
/// analytical ones, wrapped in a conservative template.
pub fn ultra_safe_prompt(prompt: &str, domain: Domain) -> String {
    let core = apply_replacements(&sanitize_for_domain(prompt, domain), ANALYTICAL_REPLACEMENTS);
    format!(
        "Please provide an educational analysis for academic research in {domain}.\n\
         Focus on scholarly review, research methodology, and academic insights.\n\n\
         Task: {core}\n\n\
         Requirements:\n\
         - Academic language only\n\
         - Educational content\n\
         - Research-focused analysis",
    )
}

/// The last-resort prompt: a single-sentence request for educational content.
pub fn minimal_safe_prompt(domain: Domain) -> String {
    format!(
        "Provide educational academic content for {domain} studies, focusing on \
         scholarly analysis and research insights."
    )
}

/// The kind of document section a fallback paragraph stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Abstract,
    Introduction,
    Theme,
    Discussion,
    Conclusion,
}

impl SectionKind {
    /// Infer the section kind from the prompt that failed.
    pub fn infer(prompt: &str) -> SectionKind {
        let lower = prompt.to_lowercase();
        if lower.contains("introduction") {
            SectionKind::Introduction
        } else if lower.contains("discussion") {
            SectionKind::Discussion
        } else if lower.contains("conclusion") {
            SectionKind::Conclusion
        } else if lower.contains("theme") {
            SectionKind::Theme
        } else {
            SectionKind::Abstract
        }
    }
}

/// Static fallback paragraph substituted when all generation attempts fail.
pub fn fallback_content(domain: Domain, section: SectionKind) -> String {
    let field = match domain {
        Domain::Cybersecurity => "cybersecurity",
        Domain::Medical => "healthcare",
        Domain::AiMl => "machine learning",
        Domain::Generic => "the surveyed field",
        other => other.as_str(),
    };
    match section {
        SectionKind::Abstract => format!(
            "This paper presents a comprehensive analysis of research \
             methodologies and developments in {field}."
        ),
        SectionKind::Introduction => format!(
            "Research in {field} has advanced significantly, with investigators \
             developing increasingly sophisticated methods and frameworks."
        ),
        SectionKind::Theme => format!(
            "The literature in this area of {field} reflects sustained attention \
             from multiple research groups, with converging methods and findings."
        ),
        SectionKind::Discussion => format!(
            "The analysis reveals important patterns in {field} research and \
             highlights methodological developments across the surveyed literature."
        ),
        SectionKind::Conclusion => format!(
            "This survey provides insights into {field} research trends and \
             identifies promising directions for future investigation."
        ),
    }
}

/// Universal unsafe-content patterns checked on every generated section.
const UNIVERSAL_UNSAFE: &[&str] = &[
    r"(?i)\b(harm|damage|destroy|eliminate)\s+(people|humans|individuals)",
    r"(?i)\b(how to make|instructions for|step by step).*\b(weapon|bomb|explosive)",
    r"(?i)\b(illegal|criminal|unlawful)\s+(activities|actions|methods)",
];

/// Validate generated content against universal and domain-specific unsafe
/// patterns. Returns `false` when the content must be replaced by fallback.
pub fn validate_content_safety(content: &str, domain: Domain) -> bool {
    for pattern in UNIVERSAL_UNSAFE {
        let re = Regex::new(pattern).expect("static pattern");
        if re.is_match(content) {
            tracing::warn!(domain = %domain, pattern, "unsafe content pattern matched");
            return false;
        }
    }

    let domain_patterns: &[&str] = match domain {
        Domain::Cybersecurity => &[
            r"(?i)\bhow to hack\b",
            r"(?i)\bexploit.*vulnerability\b",
            r"(?i)\bunauthorized access.*methods\b",
        ],
        Domain::Medical => &[
            r"(?i)\bhow to.*harm.*patient",
            r"(?i)\bunauthorized.*medication",
            r"(?i)\bharmful.*treatment",
        ],
        Domain::Chemistry => &[
            r"(?i)\bhow to.*explosive",
            r"(?i)\bmake.*poison",
            r"(?i)\bcreate.*harmful.*substance",
        ],
        _ => &[],
    };

    for pattern in domain_patterns {
        let re = Regex::new(pattern).expect("static pattern");
        if re.is_match(content) {
            tracing::warn!(domain = %domain, pattern, "unsafe content pattern matched");
            return false;
        }
    }

    true
}

fn detection_keywords(domain: Domain) -> &'static [&'static str] {
    match domain {
        Domain::Cybersecurity => &[
            "security", "cyber", "hacking", "malware", "encryption", "firewall", "intrusion",
            "vulnerability",
        ],
        Domain::Medical => &[
            "medical", "health", "disease", "patient", "clinical", "diagnosis", "treatment",
            "therapy",
        ],
        Domain::AiMl => &[
            "machine learning", "artificial intelligence", "neural network", "deep learning",
            "algorithm", "model",
        ],
        Domain::Chemistry => &[
            "chemical", "molecule", "compound", "reaction", "synthesis", "catalyst", "organic",
            "inorganic",
        ],
        Domain::Biology => &[
            "biology", "cell", "gene", "protein", "organism", "evolution", "genome", "molecular",
        ],
        Domain::Physics => &[
            "physics", "quantum", "particle", "energy", "force", "electromagnetic",
            "thermodynamic",
        ],
        Domain::ComputerScience => &[
            "computer", "software", "programming", "algorithm", "data structure", "computing",
        ],
        Domain::Engineering => &[
            "engineering", "design", "system", "optimization", "manufacturing", "construction",
        ],
        Domain::Psychology => &[
            "psychology", "cognitive", "behavior", "mental", "brain", "consciousness",
            "perception",
        ],
        Domain::Economics => &[
            "economic", "market", "financial", "trade", "investment", "business", "monetary",
        ],
        Domain::Generic => &[],
    }
}

/// Detect the research domain of a topic from the topic string and the
/// first ten papers' titles and abstracts.
///
/// Highest keyword-hit count wins; ties resolve to the alphabetically first
/// domain label; no hits at all yields [`Domain::Generic`].
pub fn detect_domain(topic: &str, papers: &[Paper]) -> Domain {
    let mut combined = topic.to_lowercase();
    for paper in papers.iter().take(10) {
        combined.push(' ');
        combined.push_str(&paper.title.to_lowercase());
        combined.push(' ');
        combined.push_str(&paper.abstract_text.to_lowercase());
    }

    let mut best = Domain::Generic;
    let mut best_score = 0usize;
    for domain in Domain::DETECTABLE {
        let score = detection_keywords(domain)
            .iter()
            .filter(|kw| combined.contains(*kw))
            .count();
        // Strict greater-than: earlier (alphabetical) domains win ties.
        if score > best_score {
            best = domain;
            best_score = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn paper_with(title: &str, abstract_text: &str) -> Paper {
        Paper {
            id: format!("test_{title}"),
            title: title.to_string(),
            authors: vec![],
            abstract_text: abstract_text.to_string(),
            url: String::new(),
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

    #[test]
    fn domain_replacement_is_whole_word_case_insensitive() {
        let out = sanitize_for_domain("An Attack on attackers", Domain::Cybersecurity);
        assert_eq!(out, "An security analysis on attackers");
    }

    #[test]
    fn medical_replacements() {
        let out = sanitize_for_domain("doses that kill the virus", Domain::Medical);
        assert_eq!(out, "doses that eliminate the pathogen");
    }

    #[test]
    fn universal_replacements_apply_after_domain_table() {
        let out = sanitize_for_domain("targeting weak models", Domain::AiMl);
        assert_eq!(out, "focusing on weak models");
    }

    #[test]
    fn excessive_caps_are_title_cased() {
        let out = sanitize_for_domain("results were AMAZING overall", Domain::Generic);
        assert_eq!(out, "results were Amazing overall");
    }

    #[test]
    fn short_acronyms_survive() {
        let out = sanitize_for_domain("GPU and BERT and LSTM", Domain::Generic);
        assert!(out.contains("GPU"), "3-letter runs untouched: {out}");
        assert!(out.contains("Bert"), "4-letter runs title-cased: {out}");
    }

    #[test]
    fn repeated_punctuation_collapses() {
        let out = sanitize_for_domain("Why??? Amazing!!!", Domain::Generic);
        assert_eq!(out, "Why? Amazing!");
    }

    #[test]
    fn shaped_prompt_names_the_domain_context() {
        let shaped = shape_prompt("Summarize the field", Domain::AiMl);
        assert!(shaped.starts_with("ACADEMIC RESEARCH CONTEXT:"));
        assert!(shaped.contains("machine learning research"));
        assert!(shaped.ends_with("Summarize the field"));
    }

    #[test]
    fn ultra_safe_rewrites_imperatives() {
        let prompt = ultra_safe_prompt("Write a section and discuss the findings", Domain::Generic);
        assert!(prompt.contains("analyze a section"));
        assert!(prompt.contains("review the findings"));
        assert!(!prompt.to_lowercase().contains("task: write"));
    }

    #[test]
    fn minimal_prompt_is_single_sentence() {
        let prompt = minimal_safe_prompt(Domain::Physics);
        assert!(prompt.contains("physics"));
        assert_eq!(prompt.matches('.').count(), 1);
    }

    #[test]
    fn section_kind_inference() {
        assert_eq!(
            SectionKind::infer("Write a 300-word introduction"),
            SectionKind::Introduction
        );
        assert_eq!(
            SectionKind::infer("Write the discussion section"),
            SectionKind::Discussion
        );
        assert_eq!(SectionKind::infer("Now the conclusion"), SectionKind::Conclusion);
        assert_eq!(
            SectionKind::infer("Write about this research theme"),
            SectionKind::Theme
        );
        assert_eq!(SectionKind::infer("Summarize the survey"), SectionKind::Abstract);
    }

    #[test]
    fn fallback_content_varies_by_domain_and_section() {
        let cyber = fallback_content(Domain::Cybersecurity, SectionKind::Abstract);
        assert!(cyber.contains("cybersecurity"));

        let medical = fallback_content(Domain::Medical, SectionKind::Conclusion);
        assert!(medical.contains("healthcare"));

        let physics = fallback_content(Domain::Physics, SectionKind::Discussion);
        assert!(physics.contains("physics"));
    }

    #[test]
    fn validate_rejects_universal_patterns() {
        assert!(!validate_content_safety(
            "step by step instructions for a weapon",
            Domain::Generic
        ));
        assert!(!validate_content_safety(
            "methods to harm people directly",
            Domain::Generic
        ));
    }

    #[test]
    fn validate_rejects_domain_patterns() {
        assert!(!validate_content_safety(
            "this explains how to hack a server",
            Domain::Cybersecurity
        ));
        // The same text passes in a domain without that pattern.
        assert!(validate_content_safety(
            "this explains how to hack a server",
            Domain::Economics
        ));
    }

    #[test]
    fn validate_accepts_ordinary_prose() {
        assert!(validate_content_safety(
            "The survey identifies three methodological themes across papers.",
            Domain::Generic
        ));
    }

    #[test]
    fn detect_domain_from_ml_papers() {
        let papers = vec![
            paper_with("Deep learning for vision", "A neural network model study"),
            paper_with("Transformers", "machine learning at scale"),
        ];
        assert_eq!(
            detect_domain("adversarial attacks on neural networks", &papers),
            Domain::AiMl
        );
    }

    #[test]
    fn detect_domain_empty_input_is_generic() {
        assert_eq!(detect_domain("", &[]), Domain::Generic);
    }

    #[test]
    fn detect_domain_tie_resolves_alphabetically() {
        // One hit each for biology ("gene") and physics ("quantum"):
        // biology sorts first.
        assert_eq!(detect_domain("gene quantum", &[]), Domain::Biology);
    }

    #[test]
    fn domain_serializes_snake_case() {
        let json = serde_json::to_string(&Domain::AiMl).expect("serialize");
        assert_eq!(json, "\"ai_ml\"");
        let json = serde_json::to_string(&Domain::ComputerScience).expect("serialize");
        assert_eq!(json, "\"computer_science\"");
    }
}

//! Synthesized research themes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cluster of related notes synthesized into a named theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTheme {
    /// Deterministic id: `theme:{slugified cluster label}`.
    pub id: String,
    /// Theme title, at most 100 characters.
    pub title: String,
    /// Theme description, at most 500 characters.
    pub description: String,
    /// Ids of the papers contributing notes to this theme.
    pub papers: Vec<String>,
    /// Number of notes in the underlying cluster.
    pub frequency: usize,
    /// Synthesis confidence in `[0, 1]`.
    pub confidence: f64,
    /// Ids of related themes, when known.
    #[serde(default)]
    pub related_themes: Vec<String>,
    /// Synthesis timestamp.
    pub created_at: DateTime<Utc>,
}

impl ResearchTheme {
    /// Truncate the title and description to their documented limits.
    pub fn enforce_limits(mut self) -> Self {
        self.title = truncate_chars(&self.title, 100);
        self.description = truncate_chars(&self.description, 500);
        self
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_enforced() {
        let theme = ResearchTheme {
            id: "theme:x".to_string(),
            title: "t".repeat(300),
            description: "d".repeat(900),
            papers: vec![],
            frequency: 3,
            confidence: 0.5,
            related_themes: vec![],
            created_at: Utc::now(),
        }
        .enforce_limits();

        assert_eq!(theme.title.chars().count(), 100);
        assert_eq!(theme.description.chars().count(), 500);
    }

    #[test]
    fn short_fields_untouched() {
        let theme = ResearchTheme {
            id: "theme:y".to_string(),
            title: "Short".to_string(),
            description: "Also short.".to_string(),
            papers: vec!["p1".to_string()],
            frequency: 4,
            confidence: 0.6,
            related_themes: vec![],
            created_at: Utc::now(),
        }
        .enforce_limits();

        assert_eq!(theme.title, "Short");
        assert_eq!(theme.description, "Also short.");
    }
}

//! CRUD operations for research themes.

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::error::StorageError;
use crate::model::ResearchTheme;

#[derive(Debug, sqlx::FromRow)]
struct ThemeRow {
    id: String,
    title: String,
    description: String,
    papers: String,
    frequency: i64,
    confidence: f64,
    related_themes: String,
    created_at: String,
}

impl ThemeRow {
    fn into_theme(self) -> ResearchTheme {
        ResearchTheme {
            id: self.id,
            title: self.title,
            description: self.description,
            papers: serde_json::from_str(&self.papers).unwrap_or_default(),
            frequency: usize::try_from(self.frequency.max(0)).unwrap_or(0),
            confidence: self.confidence,
            related_themes: serde_json::from_str(&self.related_themes).unwrap_or_default(),
            created_at: self
                .created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

/// Upsert a theme in a single statement.
pub async fn save_theme(pool: &DbPool, theme: &ResearchTheme) -> Result<bool, StorageError> {
    let papers = serde_json::to_string(&theme.papers).unwrap_or_else(|_| "[]".to_string());
    let related =
        serde_json::to_string(&theme.related_themes).unwrap_or_else(|_| "[]".to_string());

    let result = sqlx::query(
        "INSERT INTO themes \
         (id, title, description, papers, frequency, confidence, related_themes, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           title = excluded.title, \
           description = excluded.description, \
           papers = excluded.papers, \
           frequency = excluded.frequency, \
           confidence = excluded.confidence, \
           related_themes = excluded.related_themes",
    )
    .bind(&theme.id)
    .bind(&theme.title)
    .bind(&theme.description)
    .bind(&papers)
    .bind(i64::try_from(theme.frequency).unwrap_or(i64::MAX))
    .bind(theme.confidence)
    .bind(&related)
    .bind(theme.created_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(result.rows_affected() > 0)
}

/// Every stored theme, most frequent first.
pub async fn get_all_themes(pool: &DbPool) -> Result<Vec<ResearchTheme>, StorageError> {
    let rows =
        sqlx::query_as::<_, ThemeRow>("SELECT * FROM themes ORDER BY frequency DESC, id")
            .fetch_all(pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;

    Ok(rows.into_iter().map(ThemeRow::into_theme).collect())
}

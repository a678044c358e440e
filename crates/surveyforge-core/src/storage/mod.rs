//! SQLite persistence for papers, notes, themes, and citations.
//!
//! The workflow depends only on the [`ResearchStore`] contract; stages
//! receive the store at construction and never reach into shared globals.
//! [`SqliteStore`] is the default implementation, using SQLx with WAL mode
//! for concurrent access and embedded migrations.

pub mod citations;
pub mod notes;
pub mod papers;
pub mod themes;

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::error::StorageError;
use crate::model::{Citation, Paper, ResearchNote, ResearchTheme};

/// Type alias for the SQLite connection pool.
pub type DbPool = sqlx::SqlitePool;

/// Sort orders accepted by `search_papers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Title-match strength, then citation count.
    Relevance,
    /// Publication date, newest first.
    Date,
    /// Citation count, highest first.
    Citations,
}

impl SortBy {
    /// Parse a sort label (`relevance`, `date`, `citations`).
    pub fn parse(s: &str) -> Option<SortBy> {
        match s.trim().to_lowercase().as_str() {
            "relevance" => Some(SortBy::Relevance),
            "date" => Some(SortBy::Date),
            "citations" => Some(SortBy::Citations),
            _ => None,
        }
    }
}

/// Row counts across the four entity tables.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub papers: u64,
    pub notes: u64,
    pub themes: u64,
    pub citations: u64,
}

/// Persistence contract the workflow depends on.
///
/// Implementations must be thread-safe; concurrent callers see atomic
/// single-record writes.
#[async_trait::async_trait]
pub trait ResearchStore: Send + Sync {
    /// Upsert a paper. Returns `true` when a row was written.
    async fn save_paper(&self, paper: &Paper) -> Result<bool, StorageError>;

    /// Fetch one paper by id.
    async fn get_paper(&self, id: &str) -> Result<Option<Paper>, StorageError>;

    /// Free-text search over titles and abstracts.
    async fn search_papers(
        &self,
        query: &str,
        limit: u32,
        sort_by: SortBy,
    ) -> Result<Vec<Paper>, StorageError>;

    /// Every stored paper.
    async fn get_all_papers(&self) -> Result<Vec<Paper>, StorageError>;

    /// Upsert a note.
    async fn save_note(&self, note: &ResearchNote) -> Result<bool, StorageError>;

    /// Every note attached to a paper.
    async fn get_notes_for_paper(&self, paper_id: &str) -> Result<Vec<ResearchNote>, StorageError>;

    /// Every stored note.
    async fn get_all_notes(&self) -> Result<Vec<ResearchNote>, StorageError>;

    /// Upsert a theme.
    async fn save_theme(&self, theme: &ResearchTheme) -> Result<bool, StorageError>;

    /// Every stored theme, most frequent first.
    async fn get_all_themes(&self) -> Result<Vec<ResearchTheme>, StorageError>;

    /// Upsert a citation.
    async fn save_citation(&self, citation: &Citation) -> Result<bool, StorageError>;

    /// The citation for a paper, when one exists.
    async fn get_citation_for_paper(
        &self,
        paper_id: &str,
    ) -> Result<Option<Citation>, StorageError>;

    /// Every stored citation.
    async fn get_all_citations(&self) -> Result<Vec<Citation>, StorageError>;

    /// Row counts across the four entity tables.
    async fn get_stats(&self) -> Result<StoreStats, StorageError>;
}

/// Default [`ResearchStore`] backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Wrap an initialized pool (see [`init_db`] / [`init_test_db`]).
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for maintenance queries.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ResearchStore for SqliteStore {
    async fn save_paper(&self, paper: &Paper) -> Result<bool, StorageError> {
        papers::save_paper(&self.pool, paper).await
    }

    async fn get_paper(&self, id: &str) -> Result<Option<Paper>, StorageError> {
        papers::get_paper(&self.pool, id).await
    }

    async fn search_papers(
        &self,
        query: &str,
        limit: u32,
        sort_by: SortBy,
    ) -> Result<Vec<Paper>, StorageError> {
        papers::search_papers(&self.pool, query, limit, sort_by).await
    }

    async fn get_all_papers(&self) -> Result<Vec<Paper>, StorageError> {
        papers::get_all_papers(&self.pool).await
    }

    async fn save_note(&self, note: &ResearchNote) -> Result<bool, StorageError> {
        notes::save_note(&self.pool, note).await
    }

    async fn get_notes_for_paper(&self, paper_id: &str) -> Result<Vec<ResearchNote>, StorageError> {
        notes::get_notes_for_paper(&self.pool, paper_id).await
    }

    async fn get_all_notes(&self) -> Result<Vec<ResearchNote>, StorageError> {
        notes::get_all_notes(&self.pool).await
    }

    async fn save_theme(&self, theme: &ResearchTheme) -> Result<bool, StorageError> {
        themes::save_theme(&self.pool, theme).await
    }

    async fn get_all_themes(&self) -> Result<Vec<ResearchTheme>, StorageError> {
        themes::get_all_themes(&self.pool).await
    }

    async fn save_citation(&self, citation: &Citation) -> Result<bool, StorageError> {
        citations::save_citation(&self.pool, citation).await
    }

    async fn get_citation_for_paper(
        &self,
        paper_id: &str,
    ) -> Result<Option<Citation>, StorageError> {
        citations::get_citation_for_paper(&self.pool, paper_id).await
    }

    async fn get_all_citations(&self) -> Result<Vec<Citation>, StorageError> {
        citations::get_all_citations(&self.pool).await
    }

    async fn get_stats(&self) -> Result<StoreStats, StorageError> {
        let papers: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM papers")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;
        let notes: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;
        let themes: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM themes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;
        let citations: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM citations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Query { source: e })?;

        Ok(StoreStats {
            papers: papers.0 as u64,
            notes: notes.0 as u64,
            themes: themes.0 as u64,
            citations: citations.0 as u64,
        })
    }
}

/// Initialize the SQLite database with settings suited to a long-running
/// workflow process.
///
/// Creates the database file and parent directories if they don't exist,
/// configures WAL mode, runs embedded migrations, and returns a pool.
pub async fn init_db(db_path: &str) -> Result<DbPool, StorageError> {
    let expanded = expand_tilde(db_path);

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
            source: sqlx::Error::Configuration(
                format!("failed to create directory {}: {e}", parent.display()).into(),
            ),
        })?;
    }

    let connect_options = SqliteConnectOptions::from_str(&format!("sqlite:{expanded}"))
        .map_err(|e| StorageError::Connection { source: e })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(300))
        .connect_with(connect_options)
        .await
        .map_err(|e| StorageError::Connection { source: e })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StorageError::Migration { source: e })?;

    Ok(pool)
}

/// Initialize an in-memory SQLite database for testing.
#[cfg(any(test, feature = "test-helpers"))]
pub async fn init_test_db() -> Result<DbPool, StorageError> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| StorageError::Connection { source: e })?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options)
        .await
        .map_err(|e| StorageError::Connection { source: e })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StorageError::Migration { source: e })?;

    Ok(pool)
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_by_parse() {
        assert_eq!(SortBy::parse("relevance"), Some(SortBy::Relevance));
        assert_eq!(SortBy::parse("Date"), Some(SortBy::Date));
        assert_eq!(SortBy::parse("citations"), Some(SortBy::Citations));
        assert_eq!(SortBy::parse("impact"), None);
    }

    #[tokio::test]
    async fn init_test_db_creates_all_tables() {
        let pool = init_test_db().await.expect("init test db");

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .expect("query tables");

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"papers"));
        assert!(table_names.contains(&"notes"));
        assert!(table_names.contains(&"themes"));
        assert!(table_names.contains(&"citations"));
    }

    #[tokio::test]
    async fn init_test_db_idempotent() {
        let pool = init_test_db().await.expect("first init");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("second migration run");
    }

    #[tokio::test]
    async fn init_db_creates_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("test.db");
        let db_path_str = db_path.to_string_lossy().to_string();

        let pool = init_db(&db_path_str).await.expect("init db");
        assert!(db_path.exists());
        pool.close().await;
    }

    #[tokio::test]
    async fn stats_count_all_tables() {
        let pool = init_test_db().await.expect("init");
        let store = SqliteStore::new(pool);

        let stats = store.get_stats().await.expect("stats");
        assert_eq!(stats.papers, 0);
        assert_eq!(stats.notes, 0);
        assert_eq!(stats.themes, 0);
        assert_eq!(stats.citations, 0);
    }
}

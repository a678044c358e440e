//! CRUD operations for papers.
//!
//! Author and keyword lists are stored as JSON arrays; the source tag is
//! stored only when it was set explicitly (the derived tag is recomputed).

use chrono::{DateTime, Utc};

use super::{DbPool, SortBy};
use crate::error::StorageError;
use crate::model::{Paper, SourceTag};

#[derive(Debug, sqlx::FromRow)]
struct PaperRow {
    id: String,
    title: String,
    authors: String,
    #[sqlx(rename = "abstract")]
    abstract_text: String,
    url: String,
    published_date: Option<String>,
    venue: Option<String>,
    citations: i64,
    doi: Option<String>,
    arxiv_id: Option<String>,
    keywords: String,
    full_text: Option<String>,
    source: Option<String>,
    created_at: String,
}

impl PaperRow {
    fn into_paper(self) -> Paper {
        Paper {
            id: self.id,
            title: self.title,
            authors: serde_json::from_str(&self.authors).unwrap_or_default(),
            abstract_text: self.abstract_text,
            url: self.url,
            published_date: self
                .published_date
                .and_then(|d| d.parse::<DateTime<Utc>>().ok()),
            venue: self.venue,
            citations: u32::try_from(self.citations.max(0)).unwrap_or(u32::MAX),
            doi: self.doi,
            arxiv_id: self.arxiv_id,
            keywords: serde_json::from_str(&self.keywords).unwrap_or_default(),
            full_text: self.full_text,
            source: self.source.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: self
                .created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

fn source_json(source: &Option<SourceTag>) -> Option<String> {
    source
        .as_ref()
        .and_then(|s| serde_json::to_string(s).ok())
}

/// Upsert a paper in a single statement.
pub async fn save_paper(pool: &DbPool, paper: &Paper) -> Result<bool, StorageError> {
    let authors = serde_json::to_string(&paper.authors).unwrap_or_else(|_| "[]".to_string());
    let keywords = serde_json::to_string(&paper.keywords).unwrap_or_else(|_| "[]".to_string());

    let result = sqlx::query(
        "INSERT INTO papers \
         (id, title, authors, abstract, url, published_date, venue, citations, \
          doi, arxiv_id, keywords, full_text, source, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           title = excluded.title, \
           authors = excluded.authors, \
           abstract = excluded.abstract, \
           url = excluded.url, \
           published_date = excluded.published_date, \
           venue = excluded.venue, \
           citations = excluded.citations, \
           doi = excluded.doi, \
           arxiv_id = excluded.arxiv_id, \
           keywords = excluded.keywords, \
           full_text = excluded.full_text, \
           source = excluded.source",
    )
    .bind(&paper.id)
    .bind(&paper.title)
    .bind(&authors)
    .bind(&paper.abstract_text)
    .bind(&paper.url)
    .bind(paper.published_date.map(|d| d.to_rfc3339()))
    .bind(&paper.venue)
    .bind(i64::from(paper.citations))
    .bind(&paper.doi)
    .bind(&paper.arxiv_id)
    .bind(&keywords)
    .bind(&paper.full_text)
    .bind(source_json(&paper.source))
    .bind(paper.created_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(result.rows_affected() > 0)
}

/// Fetch one paper by id.
pub async fn get_paper(pool: &DbPool, id: &str) -> Result<Option<Paper>, StorageError> {
    let row = sqlx::query_as::<_, PaperRow>("SELECT * FROM papers WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(row.map(PaperRow::into_paper))
}

/// Free-text search over titles and abstracts.
pub async fn search_papers(
    pool: &DbPool,
    query: &str,
    limit: u32,
    sort_by: SortBy,
) -> Result<Vec<Paper>, StorageError> {
    let order = match sort_by {
        SortBy::Relevance => {
            "(CASE WHEN title LIKE ?2 THEN 0 ELSE 1 END) ASC, citations DESC"
        }
        SortBy::Date => "published_date DESC",
        SortBy::Citations => "citations DESC",
    };

    let sql = format!(
        "SELECT * FROM papers WHERE title LIKE ?2 OR abstract LIKE ?2 \
         ORDER BY {order} LIMIT ?1"
    );
    let pattern = format!("%{query}%");

    let rows = sqlx::query_as::<_, PaperRow>(&sql)
        .bind(i64::from(limit))
        .bind(&pattern)
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(rows.into_iter().map(PaperRow::into_paper).collect())
}

/// Every stored paper, in insertion order.
pub async fn get_all_papers(pool: &DbPool) -> Result<Vec<Paper>, StorageError> {
    let rows = sqlx::query_as::<_, PaperRow>("SELECT * FROM papers ORDER BY created_at, id")
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(rows.into_iter().map(PaperRow::into_paper).collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::init_test_db;
    use chrono::TimeZone;

    pub(crate) fn sample_paper(id: &str, title: &str) -> Paper {
        Paper {
            id: id.to_string(),
            title: title.to_string(),
            authors: vec!["Grace Hopper".to_string()],
            abstract_text: "An abstract about compilers.".to_string(),
            url: format!("https://example.org/{id}"),
            published_date: Some(Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap()),
            venue: Some("Journal of Computing".to_string()),
            citations: 12,
            doi: Some("10.1234/example".to_string()),
            arxiv_id: None,
            keywords: vec!["compilers".to_string()],
            full_text: None,
            source: Some(SourceTag::CrossRef),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn save_and_get_round_trips() {
        let pool = init_test_db().await.expect("init db");
        let paper = sample_paper("crossref_1", "Compiler Advances");

        assert!(save_paper(&pool, &paper).await.expect("save"));

        let loaded = get_paper(&pool, "crossref_1")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.title, "Compiler Advances");
        assert_eq!(loaded.authors, vec!["Grace Hopper".to_string()]);
        assert_eq!(loaded.citations, 12);
        assert_eq!(loaded.source, Some(SourceTag::CrossRef));
        assert_eq!(loaded.published_date, paper.published_date);
    }

    #[tokio::test]
    async fn save_is_upsert() {
        let pool = init_test_db().await.expect("init db");
        let mut paper = sample_paper("crossref_1", "First Title");
        save_paper(&pool, &paper).await.expect("save");

        paper.title = "Revised Title".to_string();
        paper.citations = 99;
        save_paper(&pool, &paper).await.expect("update");

        let loaded = get_paper(&pool, "crossref_1")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(loaded.title, "Revised Title");
        assert_eq!(loaded.citations, 99);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let pool = init_test_db().await.expect("init db");
        assert!(get_paper(&pool, "nope").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn search_filters_and_sorts_by_citations() {
        let pool = init_test_db().await.expect("init db");

        let mut a = sample_paper("p1", "Neural network pruning");
        a.citations = 5;
        let mut b = sample_paper("p2", "Neural architecture search");
        b.citations = 50;
        let c = sample_paper("p3", "Unrelated chemistry topic");
        for p in [&a, &b, &c] {
            save_paper(&pool, p).await.expect("save");
        }

        let found = search_papers(&pool, "neural", 10, SortBy::Citations)
            .await
            .expect("search");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "p2");
        assert_eq!(found[1].id, "p1");
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let pool = init_test_db().await.expect("init db");
        for i in 0..5 {
            save_paper(&pool, &sample_paper(&format!("p{i}"), "Neural networks"))
                .await
                .expect("save");
        }

        let found = search_papers(&pool, "neural", 3, SortBy::Relevance)
            .await
            .expect("search");
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn search_by_date_newest_first() {
        let pool = init_test_db().await.expect("init db");
        let mut old = sample_paper("p1", "Neural history");
        old.published_date = Some(Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap());
        let new = sample_paper("p2", "Neural present");
        save_paper(&pool, &old).await.expect("save");
        save_paper(&pool, &new).await.expect("save");

        let found = search_papers(&pool, "neural", 10, SortBy::Date)
            .await
            .expect("search");
        assert_eq!(found[0].id, "p2");
    }

    #[tokio::test]
    async fn get_all_returns_everything() {
        let pool = init_test_db().await.expect("init db");
        save_paper(&pool, &sample_paper("p1", "One")).await.expect("save");
        save_paper(&pool, &sample_paper("p2", "Two")).await.expect("save");

        let all = get_all_papers(&pool).await.expect("get all");
        assert_eq!(all.len(), 2);
    }
}

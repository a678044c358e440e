//! CRUD operations for citations.

use super::DbPool;
use crate::error::StorageError;
use crate::model::Citation;

#[derive(Debug, sqlx::FromRow)]
struct CitationRow {
    id: String,
    paper_id: String,
    citation_key: String,
    apa: String,
    mla: String,
    bibtex: String,
    chicago: Option<String>,
}

impl CitationRow {
    fn into_citation(self) -> Citation {
        Citation {
            id: self.id,
            paper_id: self.paper_id,
            citation_key: self.citation_key,
            apa: self.apa,
            mla: self.mla,
            bibtex: self.bibtex,
            chicago: self.chicago,
        }
    }
}

/// Upsert a citation in a single statement.
pub async fn save_citation(pool: &DbPool, citation: &Citation) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "INSERT INTO citations (id, paper_id, citation_key, apa, mla, bibtex, chicago) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           apa = excluded.apa, \
           mla = excluded.mla, \
           bibtex = excluded.bibtex, \
           chicago = excluded.chicago",
    )
    .bind(&citation.id)
    .bind(&citation.paper_id)
    .bind(&citation.citation_key)
    .bind(&citation.apa)
    .bind(&citation.mla)
    .bind(&citation.bibtex)
    .bind(&citation.chicago)
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(result.rows_affected() > 0)
}

/// The citation for a paper, when one exists.
pub async fn get_citation_for_paper(
    pool: &DbPool,
    paper_id: &str,
) -> Result<Option<Citation>, StorageError> {
    let row = sqlx::query_as::<_, CitationRow>("SELECT * FROM citations WHERE paper_id = ?")
        .bind(paper_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(row.map(CitationRow::into_citation))
}

/// Every stored citation, by key.
pub async fn get_all_citations(pool: &DbPool) -> Result<Vec<Citation>, StorageError> {
    let rows = sqlx::query_as::<_, CitationRow>("SELECT * FROM citations ORDER BY citation_key")
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(rows.into_iter().map(CitationRow::into_citation).collect())
}

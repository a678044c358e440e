//! CRUD operations for research notes.

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::error::StorageError;
use crate::model::{NoteKind, ResearchNote};

#[derive(Debug, sqlx::FromRow)]
struct NoteRow {
    id: String,
    paper_id: String,
    content: String,
    note_type: String,
    confidence: f64,
    created_at: String,
}

impl NoteRow {
    fn into_note(self) -> ResearchNote {
        ResearchNote {
            id: self.id,
            paper_id: self.paper_id,
            content: self.content,
            note_type: NoteKind::parse(&self.note_type).unwrap_or(NoteKind::KeyFinding),
            confidence: self.confidence,
            created_at: self
                .created_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

/// Upsert a note in a single statement.
pub async fn save_note(pool: &DbPool, note: &ResearchNote) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "INSERT INTO notes (id, paper_id, content, note_type, confidence, created_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET \
           content = excluded.content, \
           note_type = excluded.note_type, \
           confidence = excluded.confidence",
    )
    .bind(&note.id)
    .bind(&note.paper_id)
    .bind(&note.content)
    .bind(note.note_type.as_str())
    .bind(note.confidence)
    .bind(note.created_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(result.rows_affected() > 0)
}

/// Every note attached to a paper, in id order.
pub async fn get_notes_for_paper(
    pool: &DbPool,
    paper_id: &str,
) -> Result<Vec<ResearchNote>, StorageError> {
    let rows = sqlx::query_as::<_, NoteRow>("SELECT * FROM notes WHERE paper_id = ? ORDER BY id")
        .bind(paper_id)
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(rows.into_iter().map(NoteRow::into_note).collect())
}

/// Every stored note.
pub async fn get_all_notes(pool: &DbPool) -> Result<Vec<ResearchNote>, StorageError> {
    let rows = sqlx::query_as::<_, NoteRow>("SELECT * FROM notes ORDER BY paper_id, id")
        .fetch_all(pool)
        .await
        .map_err(|e| StorageError::Query { source: e })?;

    Ok(rows.into_iter().map(NoteRow::into_note).collect())
}

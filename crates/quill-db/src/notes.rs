//! Note repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use quill_core::{Error, Note, NoteRepository, Result};

use crate::parse_uuid;

/// Compute the SHA-256 hex digest of note content.
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// SQLite implementation of NoteRepository.
#[derive(Clone)]
pub struct SqliteNoteRepository {
    pool: SqlitePool,
}

impl SqliteNoteRepository {
    /// Create a new SqliteNoteRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_note_row(row: sqlx::sqlite::SqliteRow) -> Result<Note> {
        Ok(Note {
            id: parse_uuid(row.get("id"))?,
            content: row.get("content"),
            content_hash: row.get("content_hash"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl NoteRepository for SqliteNoteRepository {
    async fn insert(&self, content: &str) -> Result<Uuid> {
        if content.trim().is_empty() {
            return Err(Error::Validation("Note content cannot be empty".into()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let hash = compute_content_hash(content);

        sqlx::query(
            r#"
            INSERT INTO notes (id, content, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(content)
        .bind(&hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "notes",
            op = "insert",
            note_id = %id,
            content_len = content.len(),
            "Note inserted"
        );
        Ok(id)
    }

    async fn fetch(&self, id: Uuid) -> Result<Note> {
        let row = sqlx::query("SELECT * FROM notes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::NoteNotFound(id))?;

        Self::parse_note_row(row)
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count > 0)
    }

    async fn list_all(&self) -> Result<Vec<Note>> {
        let rows = sqlx::query("SELECT * FROM notes ORDER BY created_at ASC, rowid ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_note_row).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NoteNotFound(id));
        }

        debug!(
            subsystem = "db",
            component = "notes",
            op = "delete",
            note_id = %id,
            "Note deleted"
        );
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notes")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = compute_content_hash("hello");
        let b = compute_content_hash("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_differs() {
        assert_ne!(compute_content_hash("a"), compute_content_hash("b"));
    }
}

//! Embedding repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use quill_core::{Embedding, EmbeddingRepository, Error, Result, Vector};

use crate::parse_uuid;

/// Vector blob encoding helpers.
///
/// Vectors are stored as little-endian f32 bytes. The encoding carries no
/// dimension header; dimensionality is fixed by the embedding model.
pub mod utils {
    use quill_core::{Error, Result, Vector};

    /// Encode a vector as little-endian f32 bytes.
    pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for value in vector {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Decode little-endian f32 bytes back into a vector.
    pub fn decode_vector(bytes: &[u8]) -> Result<Vector> {
        if bytes.len() % 4 != 0 {
            return Err(Error::Serialization(format!(
                "Vector blob length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

/// SQLite implementation of EmbeddingRepository.
#[derive(Clone)]
pub struct SqliteEmbeddingRepository {
    pool: SqlitePool,
}

impl SqliteEmbeddingRepository {
    /// Create a new SqliteEmbeddingRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_embedding_row(row: sqlx::sqlite::SqliteRow) -> Result<Embedding> {
        let blob: Vec<u8> = row.get("vector");
        Ok(Embedding {
            id: parse_uuid(row.get("id"))?,
            note_id: parse_uuid(row.get("note_id"))?,
            vector: utils::decode_vector(&blob)?,
            model: row.get("model"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl EmbeddingRepository for SqliteEmbeddingRepository {
    async fn upsert(&self, note_id: Uuid, vector: &Vector, model: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let blob = utils::encode_vector(vector);

        // On replacement the existing row id is kept stable.
        let stored_id: String = sqlx::query_scalar(
            r#"
            INSERT INTO embeddings (id, note_id, vector, model, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(note_id) DO UPDATE SET
                vector = excluded.vector,
                model = excluded.model,
                created_at = excluded.created_at
            RETURNING id
            "#,
        )
        .bind(id.to_string())
        .bind(note_id.to_string())
        .bind(blob)
        .bind(model)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "embeddings",
            op = "upsert",
            note_id = %note_id,
            model = model,
            dimension = vector.len(),
            "Embedding stored"
        );
        parse_uuid(&stored_id)
    }

    async fn get(&self, note_id: Uuid) -> Result<Option<Embedding>> {
        let row = sqlx::query("SELECT * FROM embeddings WHERE note_id = ?")
            .bind(note_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_embedding_row).transpose()
    }

    async fn get_many(&self, note_ids: &[Uuid]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(note_ids.len());
        for note_id in note_ids {
            if let Some(embedding) = self.get(*note_id).await? {
                embeddings.push(embedding);
            }
        }
        Ok(embeddings)
    }

    async fn delete(&self, note_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM embeddings WHERE note_id = ?")
            .bind(note_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Embedding>> {
        let rows = sqlx::query("SELECT * FROM embeddings ORDER BY created_at ASC, rowid ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_embedding_row).collect()
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::utils::*;

    #[test]
    fn test_vector_roundtrip() {
        let vector = vec![0.25f32, -1.5, 0.0, 3.75];
        let decoded = decode_vector(&encode_vector(&vector)).unwrap();
        assert_eq!(decoded, vector);
    }

    #[test]
    fn test_empty_vector_roundtrip() {
        let decoded = decode_vector(&encode_vector(&[])).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        let mut bytes = encode_vector(&[1.0, 2.0]);
        bytes.pop();
        assert!(decode_vector(&bytes).is_err());
    }
}

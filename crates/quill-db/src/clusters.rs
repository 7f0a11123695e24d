//! Cluster repository implementation.
//!
//! Cluster membership is stored as a JSON array of note ids. The store
//! rejects empty clusters; the engine deletes a cluster instead of saving
//! it with no members.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use quill_core::{Cluster, ClusterRepository, ClusterStats, Error, Result};

use crate::embeddings::utils::{decode_vector, encode_vector};
use crate::parse_uuid;

/// SQLite implementation of ClusterRepository.
#[derive(Clone)]
pub struct SqliteClusterRepository {
    pool: SqlitePool,
}

impl SqliteClusterRepository {
    /// Create a new SqliteClusterRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn encode_note_ids(note_ids: &[Uuid]) -> Result<String> {
        let strings: Vec<String> = note_ids.iter().map(|id| id.to_string()).collect();
        serde_json::to_string(&strings).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode_note_ids(json: &str) -> Result<Vec<Uuid>> {
        let strings: Vec<String> =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        strings.iter().map(|s| parse_uuid(s)).collect()
    }

    fn parse_cluster_row(row: sqlx::sqlite::SqliteRow) -> Result<Cluster> {
        let centroid_blob: Vec<u8> = row.get("centroid");
        let note_ids_json: String = row.get("note_ids");
        let parent_id: Option<String> = row.get("parent_id");

        Ok(Cluster {
            id: parse_uuid(row.get("id"))?,
            name: row.get("name"),
            centroid: decode_vector(&centroid_blob)?,
            note_ids: Self::decode_note_ids(&note_ids_json)?,
            parent_id: parent_id.as_deref().map(parse_uuid).transpose()?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ClusterRepository for SqliteClusterRepository {
    async fn upsert(&self, cluster: &Cluster) -> Result<()> {
        if cluster.note_ids.is_empty() {
            return Err(Error::Validation(format!(
                "Refusing to store empty cluster {}",
                cluster.id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO clusters (id, name, centroid, note_ids, parent_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                centroid = excluded.centroid,
                note_ids = excluded.note_ids,
                parent_id = excluded.parent_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(cluster.id.to_string())
        .bind(&cluster.name)
        .bind(encode_vector(&cluster.centroid))
        .bind(Self::encode_note_ids(&cluster.note_ids)?)
        .bind(cluster.parent_id.map(|id| id.to_string()))
        .bind(cluster.created_at)
        .bind(cluster.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "clusters",
            op = "upsert",
            cluster_id = %cluster.id,
            name = %cluster.name,
            members = cluster.len(),
            "Cluster stored"
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Cluster>> {
        let row = sqlx::query("SELECT * FROM clusters WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_cluster_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Cluster>> {
        let rows = sqlx::query("SELECT * FROM clusters ORDER BY created_at ASC, rowid ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_cluster_row).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM clusters WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "clusters",
            op = "delete",
            cluster_id = %id,
            "Cluster deleted"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM clusters")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "clusters",
            op = "clear",
            deleted = result.rows_affected(),
            "All clusters deleted"
        );
        Ok(())
    }

    async fn stats(&self) -> Result<ClusterStats> {
        let rows = sqlx::query("SELECT note_ids FROM clusters")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut stats = ClusterStats::default();
        for row in rows {
            let json: String = row.get("note_ids");
            stats.count += 1;
            stats.total_notes += Self::decode_note_ids(&json)?.len() as i64;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_ids_json_roundtrip() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let json = SqliteClusterRepository::encode_note_ids(&ids).unwrap();
        let decoded = SqliteClusterRepository::decode_note_ids(&json).unwrap();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(SqliteClusterRepository::decode_note_ids("not json").is_err());
        assert!(SqliteClusterRepository::decode_note_ids(r#"["nope"]"#).is_err());
    }
}

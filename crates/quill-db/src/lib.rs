//! # quill-db
//!
//! SQLite database layer for quill.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for notes, embeddings, clusters,
//!   the classification task queue, and the bulk batch-task state
//! - Idempotent schema bootstrap on connect
//!
//! ## Example
//!
//! ```rust,ignore
//! use quill_db::Database;
//! use quill_core::NoteRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("quill.db").await?;
//!     let note_id = db.notes.insert("Buy oat milk").await?;
//!     println!("Created note: {}", note_id);
//!     Ok(())
//! }
//! ```

pub mod batch_state;
pub mod clusters;
pub mod embeddings;
pub mod notes;
pub mod pool;
pub mod schema;
pub mod tasks;

use sqlx::SqlitePool;
use uuid::Uuid;

pub use quill_core::{Error, Result};

// Re-export core types
pub use quill_core::*;

// Re-export repository implementations
pub use batch_state::SqliteBatchStateRepository;
pub use clusters::SqliteClusterRepository;
pub use embeddings::{utils as embedding_utils, SqliteEmbeddingRepository};
pub use notes::{compute_content_hash, SqliteNoteRepository};
pub use pool::{
    create_in_memory_pool, create_pool, create_pool_with_config, log_pool_metrics, PoolConfig,
};
pub use schema::init_schema;
pub use tasks::SqliteTaskRepository;

/// Parse a UUID stored as TEXT, mapping malformed values to an internal
/// error (they indicate store corruption, not caller misuse).
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {} ({})", value, e)))
}

/// Aggregated database handle with one repository per entity.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
    pub notes: SqliteNoteRepository,
    pub embeddings: SqliteEmbeddingRepository,
    pub clusters: SqliteClusterRepository,
    pub tasks: SqliteTaskRepository,
    pub batch: SqliteBatchStateRepository,
}

impl Database {
    /// Connect to the database file at `path` (created if missing) and
    /// apply the schema.
    pub async fn connect(path: &str) -> Result<Self> {
        let pool = create_pool(path).await?;
        Self::from_pool(pool).await
    }

    /// Connect with custom pool configuration.
    pub async fn connect_with_config(path: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(path, config).await?;
        Self::from_pool(pool).await
    }

    /// Connect to an ephemeral in-memory database. Used by tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = create_in_memory_pool().await?;
        Self::from_pool(pool).await
    }

    /// Build repositories over an existing pool, applying the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        init_schema(&pool).await?;
        Ok(Self {
            notes: SqliteNoteRepository::new(pool.clone()),
            embeddings: SqliteEmbeddingRepository::new(pool.clone()),
            clusters: SqliteClusterRepository::new(pool.clone()),
            tasks: SqliteTaskRepository::new(pool.clone()),
            batch: SqliteBatchStateRepository::new(pool.clone()),
            pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        assert!(parse_uuid("not-a-uuid").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid(&id.to_string()).unwrap(), id);
    }
}

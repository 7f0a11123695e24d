//! Batch classification state repository.
//!
//! The bulk batch-classification task has exactly one state record
//! (singleton row, id = 1) plus a per-batch result cache keyed by batch
//! index. Results are written only after a whole batch succeeds, which is
//! what makes a crashed or paused run resumable from `current_batch`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use quill_core::{
    BatchResult, BatchStateRepository, BatchStatus, BatchTaskState, Error, Result, TagAssignment,
};

/// SQLite implementation of BatchStateRepository.
#[derive(Clone)]
pub struct SqliteBatchStateRepository {
    pool: SqlitePool,
}

impl SqliteBatchStateRepository {
    /// Create a new SqliteBatchStateRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BatchStateRepository for SqliteBatchStateRepository {
    async fn load(&self) -> Result<BatchTaskState> {
        let row = sqlx::query("SELECT * FROM batch_task_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(BatchTaskState::idle());
        };

        let status_str: String = row.get("status");
        let status = status_str
            .parse::<BatchStatus>()
            .map_err(Error::Internal)?;

        Ok(BatchTaskState {
            status,
            total_notes: row.get("total_notes"),
            processed_notes: row.get("processed_notes"),
            current_batch: row.get("current_batch"),
            total_batches: row.get("total_batches"),
            error: row.get("error"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            retry_count: row.get("retry_count"),
        })
    }

    async fn save(&self, state: &BatchTaskState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_task_state
                (id, status, total_notes, processed_notes, current_batch, total_batches,
                 error, started_at, completed_at, retry_count)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                total_notes = excluded.total_notes,
                processed_notes = excluded.processed_notes,
                current_batch = excluded.current_batch,
                total_batches = excluded.total_batches,
                error = excluded.error,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                retry_count = excluded.retry_count
            "#,
        )
        .bind(state.status.as_str())
        .bind(state.total_notes)
        .bind(state.processed_notes)
        .bind(state.current_batch)
        .bind(state.total_batches)
        .bind(&state.error)
        .bind(state.started_at)
        .bind(state.completed_at)
        .bind(state.retry_count)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "batch",
            op = "save_state",
            status = state.status.as_str(),
            current_batch = state.current_batch,
            total_batches = state.total_batches,
            "Batch state saved"
        );
        Ok(())
    }

    async fn save_result(&self, result: &BatchResult) -> Result<()> {
        let assignments = serde_json::to_string(&result.assignments)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO batch_results (batch_index, assignments, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(batch_index) DO UPDATE SET
                assignments = excluded.assignments,
                created_at = excluded.created_at
            "#,
        )
        .bind(result.batch_index)
        .bind(assignments)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "batch",
            op = "save_result",
            batch_index = result.batch_index,
            assignments = result.assignments.len(),
            "Batch result cached"
        );
        Ok(())
    }

    async fn load_results(&self) -> Result<Vec<BatchResult>> {
        let rows = sqlx::query("SELECT * FROM batch_results ORDER BY batch_index ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.into_iter()
            .map(|row| {
                let json: String = row.get("assignments");
                let assignments: Vec<TagAssignment> = serde_json::from_str(&json)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                Ok(BatchResult {
                    batch_index: row.get("batch_index"),
                    assignments,
                })
            })
            .collect()
    }

    async fn clear_results(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM batch_results")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "batch",
            op = "clear_results",
            deleted = result.rows_affected(),
            "Batch result cache cleared"
        );
        Ok(())
    }
}

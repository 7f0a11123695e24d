//! Classification task queue repository.
//!
//! Tasks move `pending → processing → {done | error}`. Failed tasks stay
//! in the table as a visible error record and are never retried; cleanup
//! prunes terminal tasks beyond a retention count.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use quill_core::{ClassificationTask, Error, QueueStats, Result, TaskRepository, TaskStatus};

use crate::parse_uuid;

/// SQLite implementation of TaskRepository.
#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    /// Create a new SqliteTaskRepository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_task_row(row: sqlx::sqlite::SqliteRow) -> Result<ClassificationTask> {
        let status_str: String = row.get("status");
        let status = status_str
            .parse::<TaskStatus>()
            .map_err(Error::Internal)?;

        Ok(ClassificationTask {
            id: parse_uuid(row.get("id"))?,
            note_id: parse_uuid(row.get("note_id"))?,
            status,
            error: row.get("error"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn enqueue_deduplicated(&self, note_id: Uuid) -> Result<Option<Uuid>> {
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM classification_tasks WHERE note_id = ? AND status = 'pending' LIMIT 1",
        )
        .bind(note_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if existing.is_some() {
            debug!(
                subsystem = "db",
                component = "tasks",
                op = "enqueue",
                note_id = %note_id,
                deduplicated = true,
                "Pending task already queued for note"
            );
            return Ok(None);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO classification_tasks (id, note_id, status, created_at)
            VALUES (?, ?, 'pending', ?)
            "#,
        )
        .bind(id.to_string())
        .bind(note_id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "tasks",
            op = "enqueue",
            task_id = %id,
            note_id = %note_id,
            "Task enqueued"
        );
        Ok(Some(id))
    }

    async fn claim_next(&self) -> Result<Option<ClassificationTask>> {
        // Single-worker queue: the select-then-update pair is not racy
        // because only one drain loop claims tasks.
        let row = sqlx::query(
            r#"
            SELECT * FROM classification_tasks
            WHERE status = 'pending'
            ORDER BY created_at ASC, rowid ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut task = Self::parse_task_row(row)?;

        sqlx::query("UPDATE classification_tasks SET status = 'processing' WHERE id = ?")
            .bind(task.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        task.status = TaskStatus::Processing;

        debug!(
            subsystem = "db",
            component = "tasks",
            op = "claim_next",
            task_id = %task.id,
            note_id = %task.note_id,
            "Task claimed"
        );
        Ok(Some(task))
    }

    async fn complete(&self, task_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE classification_tasks SET status = 'done', completed_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Task {} not found", task_id)));
        }
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE classification_tasks
            SET status = 'error', error = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Task {} not found", task_id)));
        }
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<ClassificationTask>> {
        let row = sqlx::query("SELECT * FROM classification_tasks WHERE id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_task_row).transpose()
    }

    async fn stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM classification_tasks GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            stats.total += n;
            match status.as_str() {
                "pending" => stats.pending = n,
                "processing" => stats.processing = n,
                "done" => stats.done = n,
                "error" => stats.error = n,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn cleanup(&self, keep_count: i64) -> Result<i64> {
        let result = sqlx::query(
            r#"
            DELETE FROM classification_tasks
            WHERE status IN ('done', 'error')
              AND id NOT IN (
                  SELECT id FROM classification_tasks
                  WHERE status IN ('done', 'error')
                  ORDER BY COALESCE(completed_at, created_at) DESC, rowid DESC
                  LIMIT ?
              )
            "#,
        )
        .bind(keep_count)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let pruned = result.rows_affected() as i64;
        if pruned > 0 {
            debug!(
                subsystem = "db",
                component = "tasks",
                op = "cleanup",
                pruned = pruned,
                keep_count = keep_count,
                "Terminal tasks pruned"
            );
        }
        Ok(pruned)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<ClassificationTask>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM classification_tasks
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_task_row).collect()
    }
}

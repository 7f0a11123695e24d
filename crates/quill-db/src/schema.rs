//! Schema bootstrap.
//!
//! The schema is applied idempotently on every connect; there is no
//! migration history table. Statements must stay compatible with an
//! existing populated database.

use sqlx::SqlitePool;
use tracing::debug;

use quill_core::{Error, Result};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS notes (
        id           TEXT PRIMARY KEY,
        content      TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS embeddings (
        id         TEXT PRIMARY KEY,
        note_id    TEXT NOT NULL UNIQUE,
        vector     BLOB NOT NULL,
        model      TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clusters (
        id         TEXT PRIMARY KEY,
        name       TEXT NOT NULL,
        centroid   BLOB NOT NULL,
        note_ids   TEXT NOT NULL,
        parent_id  TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS classification_tasks (
        id           TEXT PRIMARY KEY,
        note_id      TEXT NOT NULL,
        status       TEXT NOT NULL DEFAULT 'pending',
        error        TEXT,
        created_at   TEXT NOT NULL,
        completed_at TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_classification_tasks_status
        ON classification_tasks(status)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_classification_tasks_note
        ON classification_tasks(note_id, status)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS batch_task_state (
        id              INTEGER PRIMARY KEY CHECK (id = 1),
        status          TEXT NOT NULL,
        total_notes     INTEGER NOT NULL DEFAULT 0,
        processed_notes INTEGER NOT NULL DEFAULT 0,
        current_batch   INTEGER NOT NULL DEFAULT 0,
        total_batches   INTEGER NOT NULL DEFAULT 0,
        error           TEXT,
        started_at      TEXT,
        completed_at    TEXT,
        retry_count     INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS batch_results (
        batch_index INTEGER PRIMARY KEY,
        assignments TEXT NOT NULL,
        created_at  TEXT NOT NULL
    )
    "#,
];

/// Apply the schema to a freshly connected pool.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(Error::Database)?;
    }

    debug!(
        subsystem = "db",
        component = "schema",
        op = "init",
        "Schema applied"
    );
    Ok(())
}

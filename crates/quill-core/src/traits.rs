//! Core traits for quill abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// NOTE REPOSITORY
// =============================================================================

/// Repository for note access.
///
/// Note CRUD proper belongs to the application layer; this is the minimal
/// surface the clustering engine needs.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note. Empty or whitespace-only content is rejected.
    async fn insert(&self, content: &str) -> Result<Uuid>;

    /// Fetch a note by ID.
    async fn fetch(&self, id: Uuid) -> Result<Note>;

    /// Check if a note exists.
    async fn exists(&self, id: Uuid) -> Result<bool>;

    /// List all notes in creation order.
    async fn list_all(&self) -> Result<Vec<Note>>;

    /// Permanently delete a note.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Number of stored notes.
    async fn count(&self) -> Result<i64>;
}

// =============================================================================
// EMBEDDING REPOSITORY
// =============================================================================

/// Repository for per-note embedding vectors (one active per note).
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Store the embedding for a note, replacing any existing one.
    async fn upsert(&self, note_id: Uuid, vector: &Vector, model: &str) -> Result<Uuid>;

    /// Get the embedding for a note.
    async fn get(&self, note_id: Uuid) -> Result<Option<Embedding>>;

    /// Get embeddings for a set of notes. Missing notes are silently
    /// omitted; callers treat dangling references as transient.
    async fn get_many(&self, note_ids: &[Uuid]) -> Result<Vec<Embedding>>;

    /// Delete the embedding for a note.
    async fn delete(&self, note_id: Uuid) -> Result<()>;

    /// List all stored embeddings.
    async fn list_all(&self) -> Result<Vec<Embedding>>;

    /// Number of stored embeddings.
    async fn count(&self) -> Result<i64>;
}

// =============================================================================
// CLUSTER REPOSITORY
// =============================================================================

/// Repository for the current cluster partition.
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// Insert or replace a cluster. Empty clusters are rejected.
    async fn upsert(&self, cluster: &Cluster) -> Result<()>;

    /// Get a cluster by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Cluster>>;

    /// List all clusters.
    async fn list_all(&self) -> Result<Vec<Cluster>>;

    /// Delete a cluster.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Delete all clusters (full reclassification only).
    async fn clear(&self) -> Result<()>;

    /// Aggregate statistics: cluster count and total membership.
    async fn stats(&self) -> Result<ClusterStats>;
}

// =============================================================================
// TASK REPOSITORY
// =============================================================================

/// Repository for the durable classification task queue.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Enqueue a classification task for a note, unless a pending task for
    /// the same note already exists (idempotent enqueue). Returns the new
    /// task id, or `None` when deduplicated.
    async fn enqueue_deduplicated(&self, note_id: Uuid) -> Result<Option<Uuid>>;

    /// Claim the oldest pending task, transitioning it to `processing`.
    async fn claim_next(&self) -> Result<Option<ClassificationTask>>;

    /// Mark a task as done.
    async fn complete(&self, task_id: Uuid) -> Result<()>;

    /// Mark a task as failed, capturing the error message.
    async fn fail(&self, task_id: Uuid, error: &str) -> Result<()>;

    /// Get a task by ID.
    async fn get(&self, task_id: Uuid) -> Result<Option<ClassificationTask>>;

    /// Queue statistics (counts by status).
    async fn stats(&self) -> Result<QueueStats>;

    /// Delete terminal tasks beyond the most recent `keep_count`.
    /// Returns the number pruned.
    async fn cleanup(&self, keep_count: i64) -> Result<i64>;

    /// List the most recent tasks (any status), newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<ClassificationTask>>;
}

// =============================================================================
// BATCH STATE REPOSITORY
// =============================================================================

/// Repository for the bulk batch-classification state and result cache.
#[async_trait]
pub trait BatchStateRepository: Send + Sync {
    /// Load the singleton batch-task state (idle if never saved).
    async fn load(&self) -> Result<BatchTaskState>;

    /// Persist the singleton batch-task state.
    async fn save(&self, state: &BatchTaskState) -> Result<()>;

    /// Persist one completed batch's assignments. A batch result is only
    /// written after the whole batch succeeds (no partial-batch state).
    async fn save_result(&self, result: &BatchResult) -> Result<()>;

    /// Load all cached batch results in batch-index order.
    async fn load_results(&self) -> Result<Vec<BatchResult>>;

    /// Drop all cached batch results.
    async fn clear_results(&self) -> Result<()>;
}

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Backend for generating text embeddings.
///
/// Network-backed implementations must enforce request timeouts and report
/// failure distinctly from an empty result.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed_text(&self, text: &str) -> Result<Vector>;

    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for LLM tag assignment (bulk preview path).
#[async_trait]
pub trait TagBackend: Send + Sync {
    /// Assign 1–3 short topic tags to each note preview.
    ///
    /// Returns one assignment per input note. Malformed model output is an
    /// [`crate::Error::Parse`], which callers treat as a recoverable batch
    /// failure.
    async fn tag_notes(&self, previews: &[NotePreview]) -> Result<Vec<TagAssignment>>;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

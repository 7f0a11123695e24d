//! Core data models for quill.
//!
//! These types are shared across all quill crates and represent the core
//! domain entities: notes, embeddings, clusters, classification tasks, and
//! the bulk batch-task state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// VECTOR TYPE
// =============================================================================

/// Embedding vector type. Dimensionality is fixed per embedding model and
/// must match across all vectors compared.
pub type Vector = Vec<f32>;

// =============================================================================
// NOTE TYPES
// =============================================================================

/// A quick note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub content: String,
    /// SHA-256 hex digest of `content`, set on insert.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Bounded note preview sent to the tag-generation model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotePreview {
    pub id: Uuid,
    pub preview: String,
}

impl NotePreview {
    /// Build a preview from note content, truncated to `max_chars`
    /// (on a char boundary).
    pub fn from_content(id: Uuid, content: &str, max_chars: usize) -> Self {
        let preview = if content.chars().count() > max_chars {
            content.chars().take(max_chars).collect()
        } else {
            content.to_string()
        };
        Self { id, preview }
    }
}

// =============================================================================
// EMBEDDING TYPES
// =============================================================================

/// An embedding record linking a note to its vector representation.
/// Exactly one active embedding exists per note; reclassification replaces
/// it rather than versioning it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub id: Uuid,
    pub note_id: Uuid,
    pub vector: Vector,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// CLUSTER TYPES
// =============================================================================

/// A named, mutable group of semantically related notes.
///
/// Invariants enforced here and by the store:
/// - `note_ids` never contains duplicates;
/// - `centroid` is the component-wise mean of the member embeddings,
///   recomputed after every membership change;
/// - a cluster with empty `note_ids` is invalid and must be removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: Uuid,
    pub name: String,
    pub centroid: Vector,
    pub note_ids: Vec<Uuid>,
    /// Reserved for hierarchical grouping; never populated by the engine.
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    /// Create a new cluster. Duplicate note ids are dropped, preserving
    /// first occurrence order.
    pub fn new(name: impl Into<String>, centroid: Vector, note_ids: Vec<Uuid>) -> Self {
        let now = Utc::now();
        let mut cluster = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            centroid,
            note_ids: Vec::new(),
            parent_id: None,
            created_at: now,
            updated_at: now,
        };
        for id in note_ids {
            cluster.add_note(id);
        }
        cluster
    }

    /// Add a note id, keeping membership duplicate-free.
    /// Returns false if the note was already a member.
    pub fn add_note(&mut self, note_id: Uuid) -> bool {
        if self.note_ids.contains(&note_id) {
            return false;
        }
        self.note_ids.push(note_id);
        true
    }

    /// Remove a note id. Returns true if it was a member.
    pub fn remove_note(&mut self, note_id: Uuid) -> bool {
        let before = self.note_ids.len();
        self.note_ids.retain(|id| *id != note_id);
        self.note_ids.len() != before
    }

    /// Number of member notes.
    pub fn len(&self) -> usize {
        self.note_ids.len()
    }

    /// True when the cluster has no members (and must be removed).
    pub fn is_empty(&self) -> bool {
        self.note_ids.is_empty()
    }
}

/// Aggregate cluster statistics for status reporting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClusterStats {
    pub count: i64,
    pub total_notes: i64,
}

/// Aggregate embedding statistics for status reporting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EmbeddingStats {
    pub count: i64,
}

// =============================================================================
// CLASSIFICATION TASK TYPES
// =============================================================================

/// Status of an incremental classification task.
///
/// Lifecycle: `Pending` on enqueue → `Processing` when claimed →
/// `Done` or `Error` terminally. Failed tasks are not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl TaskStatus {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
        }
    }

    /// True for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "done" => Ok(TaskStatus::Done),
            "error" => Ok(TaskStatus::Error),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// A unit of pending classification work for one note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationTask {
    pub id: Uuid,
    pub note_id: Uuid,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue statistics summary (counts by status).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub error: i64,
}

/// Snapshot of classification state for the application layer to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationStatus {
    pub is_processing: bool,
    pub queue: QueueStats,
    pub clusters: ClusterStats,
    pub embeddings: EmbeddingStats,
}

// =============================================================================
// RECLASSIFICATION TYPES
// =============================================================================

/// Progress of a full-corpus reclassification, published on a watch channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclassifyProgress {
    pub completed: usize,
    pub total: usize,
}

/// Summary returned by a full-corpus reclassification.
///
/// A run that cannot structurally proceed (zero valid notes) reports
/// `success: false` with `error` populated rather than returning `Err`,
/// leaving existing clusters untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclassifyReport {
    pub success: bool,
    pub total: usize,
    pub completed: usize,
    pub errors: usize,
    pub clusters: usize,
    pub error: Option<String>,
}

// =============================================================================
// BATCH CLASSIFICATION TYPES (bulk preview path)
// =============================================================================

/// Status of the bulk batch-classification task.
///
/// `Idle → Running → {Paused | Completed | Error}`; `Paused → Running` on
/// resume and `Error → Running` on retry (continuing from the failed batch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl BatchStatus {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Idle => "idle",
            BatchStatus::Running => "running",
            BatchStatus::Paused => "paused",
            BatchStatus::Completed => "completed",
            BatchStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "idle" => Ok(BatchStatus::Idle),
            "running" => Ok(BatchStatus::Running),
            "paused" => Ok(BatchStatus::Paused),
            "completed" => Ok(BatchStatus::Completed),
            "error" => Ok(BatchStatus::Error),
            _ => Err(format!("Invalid batch status: {}", s)),
        }
    }
}

/// Persisted state of the bulk batch-classification task (singleton record).
///
/// `processed_notes` only increases within a run and equals the combined
/// size of batches with index below `current_batch` once a batch completes;
/// that, plus the per-batch result cache, is the crash-resumability contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTaskState {
    pub status: BatchStatus,
    pub total_notes: i64,
    pub processed_notes: i64,
    pub current_batch: i64,
    pub total_batches: i64,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: i64,
}

impl BatchTaskState {
    /// The idle (never-run or cleared) state.
    pub fn idle() -> Self {
        Self {
            status: BatchStatus::Idle,
            total_notes: 0,
            processed_notes: 0,
            current_batch: 0,
            total_batches: 0,
            error: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
        }
    }
}

impl Default for BatchTaskState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Tags assigned to one note by the tag-generation model (1–3 short tags).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagAssignment {
    pub note_id: Uuid,
    pub tags: Vec<String>,
}

/// Result of one completed tagging batch, cached for resumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_index: i64,
    pub assignments: Vec<TagAssignment>,
}

/// A proposed topic group aggregated from tag assignments.
///
/// Grouping is not a partition: a note may appear under several topics,
/// but never twice within one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicGroup {
    pub name: String,
    pub note_ids: Vec<Uuid>,
}

impl TopicGroup {
    /// Number of notes in the group.
    pub fn len(&self) -> usize {
        self.note_ids.len()
    }

    /// True when the group is empty.
    pub fn is_empty(&self) -> bool {
        self.note_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_new_deduplicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let cluster = Cluster::new("test", vec![1.0, 0.0], vec![a, b, a]);
        assert_eq!(cluster.note_ids, vec![a, b]);
    }

    #[test]
    fn test_cluster_add_note_rejects_duplicate() {
        let a = Uuid::new_v4();
        let mut cluster = Cluster::new("test", vec![1.0], vec![a]);
        assert!(!cluster.add_note(a));
        assert_eq!(cluster.len(), 1);

        let b = Uuid::new_v4();
        assert!(cluster.add_note(b));
        assert_eq!(cluster.len(), 2);
    }

    #[test]
    fn test_cluster_remove_note() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut cluster = Cluster::new("test", vec![1.0], vec![a, b]);

        assert!(cluster.remove_note(a));
        assert!(!cluster.remove_note(a));
        assert_eq!(cluster.note_ids, vec![b]);

        assert!(cluster.remove_note(b));
        assert!(cluster.is_empty());
    }

    #[test]
    fn test_cluster_parent_id_reserved() {
        let cluster = Cluster::new("test", vec![], vec![]);
        assert!(cluster.parent_id.is_none());
    }

    #[test]
    fn test_task_status_roundtrip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Done,
            TaskStatus::Error,
        ] {
            let parsed: TaskStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_task_status_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
    }

    #[test]
    fn test_batch_status_roundtrip() {
        for status in [
            BatchStatus::Idle,
            BatchStatus::Running,
            BatchStatus::Paused,
            BatchStatus::Completed,
            BatchStatus::Error,
        ] {
            let parsed: BatchStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_batch_task_state_idle() {
        let state = BatchTaskState::idle();
        assert_eq!(state.status, BatchStatus::Idle);
        assert_eq!(state.current_batch, 0);
        assert!(state.error.is_none());
        assert!(state.started_at.is_none());
    }

    #[test]
    fn test_note_preview_truncation() {
        let id = Uuid::new_v4();
        let preview = NotePreview::from_content(id, "hello world", 5);
        assert_eq!(preview.preview, "hello");

        let short = NotePreview::from_content(id, "hi", 5);
        assert_eq!(short.preview, "hi");
    }

    #[test]
    fn test_note_preview_char_boundary() {
        let id = Uuid::new_v4();
        // Multi-byte chars must not be split mid-codepoint.
        let preview = NotePreview::from_content(id, "héllo wörld", 6);
        assert_eq!(preview.preview, "héllo ");
    }
}

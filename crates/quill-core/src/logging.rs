//! Structured logging schema and field name constants for quill.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by standardized names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// =============================================================================
// IDENTITY FIELDS
// =============================================================================

/// Subsystem originating the log event.
/// Values: "cluster", "db", "inference", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "engine", "queue", "batch", "ollama", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "classify_note", "reclassify_all", "embed_texts", "claim_next"
pub const OPERATION: &str = "op";

// =============================================================================
// ENTITY FIELDS
// =============================================================================

/// Note UUID being operated on.
pub const NOTE_ID: &str = "note_id";

/// Classification task UUID being processed.
pub const TASK_ID: &str = "task_id";

/// Cluster UUID being mutated.
pub const CLUSTER_ID: &str = "cluster_id";

/// Batch index within a bulk classification run.
pub const BATCH_INDEX: &str = "batch_index";

// =============================================================================
// MEASUREMENT FIELDS
// =============================================================================

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Cosine similarity driving a join/merge decision.
pub const SIMILARITY: &str = "similarity";

/// Number of clusters after an operation.
pub const CLUSTER_COUNT: &str = "cluster_count";

// =============================================================================
// INFERENCE FIELDS
// =============================================================================

/// Model name used for inference.
pub const MODEL: &str = "model";

// =============================================================================
// OUTCOME FIELDS
// =============================================================================

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Initialize tracing with an env-filter subscriber.
///
/// Respects `RUST_LOG`; defaults to `info` for quill crates. Safe to call
/// more than once (subsequent calls are no-ops).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,quill_db=info,quill_cluster=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

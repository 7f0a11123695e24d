//! Default constants for quill.
//!
//! Policy values (thresholds, batch sizes) are tuned for the default
//! embedding model's similarity distribution and are overridable through
//! [`crate::ClusteringConfig`]; everything here is a default, not a law.

// =============================================================================
// CLUSTERING POLICY
// =============================================================================

/// Minimum cosine similarity for a note to join an existing cluster.
pub const SIMILARITY_THRESHOLD: f32 = 0.7;

/// Minimum centroid cosine similarity for two clusters to be merged.
pub const MERGE_THRESHOLD: f32 = 0.85;

/// Membership count past which a cluster is split.
pub const MAX_CLUSTER_SIZE: usize = 50;

/// Minimum membership for a split to be meaningful.
pub const MIN_SPLIT_SIZE: usize = 4;

/// Maximum characters in a derived cluster name.
pub const NAME_MAX_CHARS: usize = 10;

/// Maximum tokens sampled from note text for a derived cluster name.
pub const NAME_MAX_TOKENS: usize = 3;

/// Fallback cluster name when note text yields no usable tokens.
pub const FALLBACK_CLUSTER_NAME: &str = "Untitled";

// =============================================================================
// BATCH EMBEDDING
// =============================================================================

/// Texts per batch embedding call (safety margin below typical provider caps).
pub const EMBED_BATCH_SIZE: usize = 20;

/// Delay between per-text fallback calls after a batch failure (milliseconds).
pub const EMBED_FALLBACK_DELAY_MS: u64 = 150;

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Delay between queue tasks, to throttle embedding-provider request rate.
pub const INTER_TASK_DELAY_MS: u64 = 250;

/// Terminal (done/error) tasks retained after queue cleanup.
pub const KEEP_FINISHED_TASKS: i64 = 100;

// =============================================================================
// BATCH CLASSIFICATION (BULK PREVIEW PATH)
// =============================================================================

/// Notes per LLM tagging batch.
pub const TAG_BATCH_SIZE: usize = 30;

/// Maximum attempts per tagging batch before the task errors out.
pub const BATCH_MAX_RETRIES: u32 = 3;

/// Delay between tagging batch retry attempts (milliseconds).
pub const BATCH_RETRY_DELAY_MS: u64 = 2_000;

/// Maximum characters of note content included in a tagging prompt.
pub const PREVIEW_MAX_CHARS: usize = 200;

/// Tag groups smaller than this fold into the catch-all group.
pub const MIN_TOPIC_SIZE: usize = 2;

/// Name of the catch-all topic group.
pub const CATCH_ALL_TOPIC: &str = "Other";

// =============================================================================
// INFERENCE BACKEND
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default embedding model.
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default generation model (used for tag assignment).
pub const GEN_MODEL: &str = "qwen3:8b";

/// Default embedding dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for single-text embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for batch embedding requests (seconds).
pub const EMBED_BATCH_TIMEOUT_SECS: u64 = 60;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// EVENTS
// =============================================================================

/// Capacity of broadcast event channels.
pub const EVENT_BUS_CAPACITY: usize = 256;

//! Clustering policy configuration.
//!
//! Threshold constants are empirically tuned for one embedding model's
//! similarity distribution and do not port across models, so every policy
//! value is carried in [`ClusteringConfig`] and injected into the engine,
//! queue, and batch runner rather than read from module-level literals.

use crate::defaults;

/// Tunable policy values for the clustering engine and its workers.
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    /// Minimum cosine similarity for a note to join an existing cluster.
    pub similarity_threshold: f32,
    /// Minimum centroid similarity for a cluster pair to merge.
    pub merge_threshold: f32,
    /// Membership count past which a cluster is split.
    pub max_cluster_size: usize,
    /// Minimum membership for a split to run (no-op below this).
    pub min_split_size: usize,
    /// Texts per batch embedding call.
    pub embed_batch_size: usize,
    /// Delay between per-text fallback embedding calls (milliseconds).
    pub embed_fallback_delay_ms: u64,
    /// Notes per LLM tagging batch.
    pub tag_batch_size: usize,
    /// Attempts per tagging batch before the bulk task errors out.
    pub batch_max_retries: u32,
    /// Delay between tagging batch retries (milliseconds).
    pub batch_retry_delay_ms: u64,
    /// Maximum characters of note content in a tagging prompt.
    pub preview_max_chars: usize,
    /// Tag groups smaller than this fold into the catch-all group.
    pub min_topic_size: usize,
    /// Delay between queue tasks (milliseconds).
    pub inter_task_delay_ms: u64,
    /// Terminal tasks retained after queue cleanup.
    pub keep_finished_tasks: i64,
    /// Maximum characters in a derived cluster name.
    pub name_max_chars: usize,
    /// Maximum tokens sampled for a derived cluster name.
    pub name_max_tokens: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: defaults::SIMILARITY_THRESHOLD,
            merge_threshold: defaults::MERGE_THRESHOLD,
            max_cluster_size: defaults::MAX_CLUSTER_SIZE,
            min_split_size: defaults::MIN_SPLIT_SIZE,
            embed_batch_size: defaults::EMBED_BATCH_SIZE,
            embed_fallback_delay_ms: defaults::EMBED_FALLBACK_DELAY_MS,
            tag_batch_size: defaults::TAG_BATCH_SIZE,
            batch_max_retries: defaults::BATCH_MAX_RETRIES,
            batch_retry_delay_ms: defaults::BATCH_RETRY_DELAY_MS,
            preview_max_chars: defaults::PREVIEW_MAX_CHARS,
            min_topic_size: defaults::MIN_TOPIC_SIZE,
            inter_task_delay_ms: defaults::INTER_TASK_DELAY_MS,
            keep_finished_tasks: defaults::KEEP_FINISHED_TASKS,
            name_max_chars: defaults::NAME_MAX_CHARS,
            name_max_tokens: defaults::NAME_MAX_TOKENS,
        }
    }
}

impl ClusteringConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `QUILL_SIMILARITY_THRESHOLD` | `0.7` |
    /// | `QUILL_MERGE_THRESHOLD` | `0.85` |
    /// | `QUILL_MAX_CLUSTER_SIZE` | `50` |
    /// | `QUILL_EMBED_BATCH_SIZE` | `20` |
    /// | `QUILL_TAG_BATCH_SIZE` | `30` |
    /// | `QUILL_BATCH_MAX_RETRIES` | `3` |
    /// | `QUILL_INTER_TASK_DELAY_MS` | `250` |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<f32>("QUILL_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = v;
        }
        if let Some(v) = env_parse::<f32>("QUILL_MERGE_THRESHOLD") {
            config.merge_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("QUILL_MAX_CLUSTER_SIZE") {
            config.max_cluster_size = v.max(1);
        }
        if let Some(v) = env_parse::<usize>("QUILL_EMBED_BATCH_SIZE") {
            config.embed_batch_size = v.max(1);
        }
        if let Some(v) = env_parse::<usize>("QUILL_TAG_BATCH_SIZE") {
            config.tag_batch_size = v.max(1);
        }
        if let Some(v) = env_parse::<u32>("QUILL_BATCH_MAX_RETRIES") {
            config.batch_max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("QUILL_INTER_TASK_DELAY_MS") {
            config.inter_task_delay_ms = v;
        }

        config
    }

    /// Set the join similarity threshold.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Set the merge threshold.
    pub fn with_merge_threshold(mut self, threshold: f32) -> Self {
        self.merge_threshold = threshold;
        self
    }

    /// Set the maximum cluster size.
    pub fn with_max_cluster_size(mut self, size: usize) -> Self {
        self.max_cluster_size = size;
        self
    }

    /// Set the LLM tagging batch size.
    pub fn with_tag_batch_size(mut self, size: usize) -> Self {
        self.tag_batch_size = size.max(1);
        self
    }

    /// Set the inter-task delay.
    pub fn with_inter_task_delay_ms(mut self, ms: u64) -> Self {
        self.inter_task_delay_ms = ms;
        self
    }

    /// Set the batch retry delay.
    pub fn with_batch_retry_delay_ms(mut self, ms: u64) -> Self {
        self.batch_retry_delay_ms = ms;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClusteringConfig::default();
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.merge_threshold, 0.85);
        assert_eq!(config.max_cluster_size, 50);
        assert_eq!(config.min_split_size, 4);
        assert_eq!(config.embed_batch_size, 20);
        assert_eq!(config.tag_batch_size, 30);
        assert_eq!(config.batch_max_retries, 3);
        assert_eq!(config.min_topic_size, 2);
        assert_eq!(config.keep_finished_tasks, 100);
    }

    #[test]
    fn test_config_builder() {
        let config = ClusteringConfig::new()
            .with_similarity_threshold(0.5)
            .with_merge_threshold(0.9)
            .with_max_cluster_size(10)
            .with_inter_task_delay_ms(0);

        assert_eq!(config.similarity_threshold, 0.5);
        assert_eq!(config.merge_threshold, 0.9);
        assert_eq!(config.max_cluster_size, 10);
        assert_eq!(config.inter_task_delay_ms, 0);
    }

    #[test]
    fn test_config_builder_order_independence() {
        let a = ClusteringConfig::new()
            .with_tag_batch_size(5)
            .with_similarity_threshold(0.6);
        let b = ClusteringConfig::new()
            .with_similarity_threshold(0.6)
            .with_tag_batch_size(5);

        assert_eq!(a.tag_batch_size, b.tag_batch_size);
        assert_eq!(a.similarity_threshold, b.similarity_threshold);
    }

    #[test]
    fn test_tag_batch_size_floor() {
        let config = ClusteringConfig::new().with_tag_batch_size(0);
        assert_eq!(config.tag_batch_size, 1);
    }
}

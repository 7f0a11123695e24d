//! Mock inference backend for deterministic testing.
//!
//! Generates deterministic embeddings seeded from the input text, so the
//! same text always maps to the same vector, and scripted tag responses.
//! Failure injection covers both the random-rate style and exact
//! fail-the-next-N-calls scripting used by retry tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quill_inference::mock::MockInferenceBackend;
//!
//! let backend = MockInferenceBackend::new()
//!     .with_dimension(8)
//!     .with_embedding_mapping("buy milk", vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use quill_core::{
    EmbeddingBackend, Error, NotePreview, Result, TagAssignment, TagBackend, Vector,
};

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    scripted_failures: Arc<Mutex<ScriptedFailures>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    embedding_mappings: HashMap<String, Vector>,
    tag_mappings: HashMap<String, Vec<String>>,
    latency_ms: u64,
    failure_rate: f64,
}

#[derive(Debug, Default)]
struct ScriptedFailures {
    embed_failures: u32,
    tag_skip: u32,
    tag_failures: u32,
}

/// One logged backend call, for assertions.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 8,
            embedding_mappings: HashMap::new(),
            tag_mappings: HashMap::new(),
            latency_ms: 0,
            failure_rate: 0.0,
        }
    }
}

impl MockInferenceBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
            scripted_failures: Arc::new(Mutex::new(ScriptedFailures::default())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Pin the embedding returned for a specific text.
    pub fn with_embedding_mapping(mut self, text: impl Into<String>, vector: Vector) -> Self {
        Arc::make_mut(&mut self.config)
            .embedding_mappings
            .insert(text.into(), vector);
        self
    }

    /// Pin the tags returned for a specific preview text.
    pub fn with_tag_mapping(
        mut self,
        preview: impl Into<String>,
        tags: Vec<impl Into<String>>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .tag_mappings
            .insert(preview.into(), tags.into_iter().map(Into::into).collect());
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fail the next `n` embedding calls, then succeed again.
    pub fn fail_next_embeds(&self, n: u32) {
        self.scripted_failures.lock().unwrap().embed_failures = n;
    }

    /// Fail the next `n` tagging calls, then succeed again.
    pub fn fail_next_tags(&self, n: u32) {
        self.fail_tags_after(0, n);
    }

    /// Let `skip` tagging calls succeed, fail the following `n`, then
    /// succeed again.
    pub fn fail_tags_after(&self, skip: u32, n: u32) {
        let mut scripted = self.scripted_failures.lock().unwrap();
        scripted.tag_skip = skip;
        scripted.tag_failures = n;
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }

    /// Number of embedding calls (single and batch).
    pub fn embed_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation.starts_with("embed"))
            .count()
    }

    /// Number of tagging calls.
    pub fn tag_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "tag_notes")
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }

    fn should_fail_random(&self) -> bool {
        use rand::Rng;
        self.config.failure_rate > 0.0
            && rand::thread_rng().gen::<f64>() < self.config.failure_rate
    }

    fn take_scripted_embed_failure(&self) -> bool {
        let mut scripted = self.scripted_failures.lock().unwrap();
        if scripted.embed_failures > 0 {
            scripted.embed_failures -= 1;
            true
        } else {
            false
        }
    }

    fn take_scripted_tag_failure(&self) -> bool {
        let mut scripted = self.scripted_failures.lock().unwrap();
        if scripted.tag_skip > 0 {
            scripted.tag_skip -= 1;
            return false;
        }
        if scripted.tag_failures > 0 {
            scripted.tag_failures -= 1;
            true
        } else {
            false
        }
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }

    fn vector_for(&self, text: &str) -> Vector {
        if let Some(vector) = self.config.embedding_mappings.get(text) {
            return vector.clone();
        }
        deterministic_embedding(text, self.config.dimension)
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a deterministic unit-norm embedding seeded from the text.
pub fn deterministic_embedding(text: &str, dimension: usize) -> Vector {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut state = hasher.finish();

    let mut vector = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let value = (state as f64 / u64::MAX as f64) as f32 * 2.0 - 1.0;
        vector.push(value);
    }

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_text(&self, text: &str) -> Result<Vector> {
        self.log_call("embed_text", text);
        self.simulate_latency().await;

        if self.take_scripted_embed_failure() || self.should_fail_random() {
            return Err(Error::Embedding("Simulated embedding failure".into()));
        }
        Ok(self.vector_for(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.log_call("embed_texts", &texts.join("\n"));
        self.simulate_latency().await;

        if self.take_scripted_embed_failure() || self.should_fail_random() {
            return Err(Error::Embedding("Simulated embedding failure".into()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl TagBackend for MockInferenceBackend {
    async fn tag_notes(&self, previews: &[NotePreview]) -> Result<Vec<TagAssignment>> {
        let joined: Vec<String> = previews.iter().map(|p| p.preview.clone()).collect();
        self.log_call("tag_notes", &joined.join("\n"));
        self.simulate_latency().await;

        if self.take_scripted_tag_failure() || self.should_fail_random() {
            return Err(Error::Inference("Simulated tagging failure".into()));
        }

        Ok(previews
            .iter()
            .map(|preview| {
                let tags = self
                    .config
                    .tag_mappings
                    .get(&preview.preview)
                    .cloned()
                    .unwrap_or_else(|| {
                        // Default: tag by the first word of the preview.
                        let word = preview
                            .preview
                            .split_whitespace()
                            .next()
                            .unwrap_or("note")
                            .to_lowercase();
                        vec![word]
                    });
                TagAssignment {
                    note_id: preview.id,
                    tags,
                }
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-tagger"
    }
}

//! # quill-inference
//!
//! Inference backends for quill: Ollama-backed embeddings and LLM tag
//! generation, plus a deterministic mock for tests.
//!
//! The [`quill_core::EmbeddingBackend`] and [`quill_core::TagBackend`]
//! traits are the seams; everything downstream (the clustering engine, the
//! task queue, the batch classifier) is written against those traits and
//! never against a concrete backend.

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod ollama;
pub mod tags;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockInferenceBackend;
pub use ollama::{
    OllamaBackend, DEFAULT_DIMENSION, DEFAULT_EMBED_MODEL, DEFAULT_GEN_MODEL, DEFAULT_OLLAMA_URL,
};
pub use tags::{build_tag_prompt, parse_tag_response, TAG_SYSTEM_PROMPT};

// Re-export the backend traits for convenience.
pub use quill_core::{EmbeddingBackend, TagBackend};

//! Ollama inference backend implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use quill_core::{
    defaults, EmbeddingBackend, Error, NotePreview, Result, TagAssignment, TagBackend, Vector,
};

use crate::tags::{build_tag_prompt, parse_tag_response, TAG_SYSTEM_PROMPT};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = defaults::OLLAMA_URL;

/// Default embedding model.
pub const DEFAULT_EMBED_MODEL: &str = defaults::EMBED_MODEL;

/// Default tag-generation model.
pub const DEFAULT_GEN_MODEL: &str = defaults::GEN_MODEL;

/// Default embedding dimension for nomic-embed-text.
pub const DEFAULT_DIMENSION: usize = defaults::EMBED_DIMENSION;

/// Ollama inference backend.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    embed_model: String,
    gen_model: String,
    dimension: usize,
    embed_timeout_secs: u64,
    embed_batch_timeout_secs: u64,
    gen_timeout_secs: u64,
}

impl OllamaBackend {
    /// Create a new Ollama backend with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(
            DEFAULT_OLLAMA_URL.to_string(),
            DEFAULT_EMBED_MODEL.to_string(),
            DEFAULT_GEN_MODEL.to_string(),
            DEFAULT_DIMENSION,
        )
    }

    /// Create a new Ollama backend with custom configuration.
    pub fn with_config(
        base_url: String,
        embed_model: String,
        gen_model: String,
        dimension: usize,
    ) -> Result<Self> {
        let embed_timeout = env_parse("QUILL_EMBED_TIMEOUT_SECS", defaults::EMBED_TIMEOUT_SECS);
        let embed_batch_timeout = env_parse(
            "QUILL_EMBED_BATCH_TIMEOUT_SECS",
            defaults::EMBED_BATCH_TIMEOUT_SECS,
        );
        let gen_timeout = env_parse("QUILL_GEN_TIMEOUT_SECS", defaults::GEN_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(gen_timeout))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "ollama",
            url = %base_url,
            embed_model = %embed_model,
            gen_model = %gen_model,
            "Initializing Ollama backend"
        );

        Ok(Self {
            client,
            base_url,
            embed_model,
            gen_model,
            dimension,
            embed_timeout_secs: embed_timeout,
            embed_batch_timeout_secs: embed_batch_timeout,
            gen_timeout_secs: gen_timeout,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let embed_model =
            std::env::var("OLLAMA_EMBED_MODEL").unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string());
        let gen_model =
            std::env::var("OLLAMA_GEN_MODEL").unwrap_or_else(|_| DEFAULT_GEN_MODEL.to_string());
        let dimension = std::env::var("OLLAMA_EMBED_DIM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DIMENSION);

        Self::with_config(base_url, embed_model, gen_model, dimension)
    }

    /// The tag-generation model name.
    pub fn gen_model(&self) -> &str {
        &self.gen_model
    }

    async fn embed_request(&self, texts: &[String], timeout_secs: u64) -> Result<Vec<Vector>> {
        let start = Instant::now();

        let request = EmbeddingRequest {
            model: self.embed_model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .timeout(Duration::from_secs(timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Ollama returned {} embeddings for {} inputs",
                result.embeddings.len(),
                texts.len()
            )));
        }

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            result_count = result.embeddings.len(),
            duration_ms = elapsed,
            "Embedding complete"
        );
        if elapsed > 5000 {
            warn!(
                duration_ms = elapsed,
                input_count = texts.len(),
                slow = true,
                "Slow embedding operation"
            );
        }
        Ok(result.embeddings)
    }

    /// Chat completion with enforced JSON output.
    async fn chat_json(&self, system: &str, prompt: &str) -> Result<String> {
        let start = Instant::now();

        let request = ChatRequest {
            model: self.gen_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            format: Some(serde_json::json!("json")),
            // Suppress chain-of-thought for thinking models (qwen3 etc.).
            think: Some(false),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.gen_timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > 30000 {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(content)
    }
}

fn env_parse(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vector>,
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Ollama format enforcement. Set to `"json"` for guaranteed valid JSON output.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    #[instrument(skip(self, text), fields(subsystem = "inference", component = "ollama", op = "embed_text", model = %self.embed_model))]
    async fn embed_text(&self, text: &str) -> Result<Vector> {
        let mut vectors = self
            .embed_request(&[text.to_string()], self.embed_timeout_secs)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("Ollama returned no embedding".into()))
    }

    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "ollama", op = "embed_texts", model = %self.embed_model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        self.embed_request(texts, self.embed_batch_timeout_secs)
            .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.embed_model
    }
}

#[async_trait]
impl TagBackend for OllamaBackend {
    #[instrument(skip(self, previews), fields(subsystem = "inference", component = "ollama", op = "tag_notes", model = %self.gen_model, input_count = previews.len()))]
    async fn tag_notes(&self, previews: &[NotePreview]) -> Result<Vec<TagAssignment>> {
        if previews.is_empty() {
            return Ok(vec![]);
        }

        let prompt = build_tag_prompt(previews);
        let body = self.chat_json(TAG_SYSTEM_PROMPT, &prompt).await?;
        parse_tag_response(&body, previews)
    }

    fn model_name(&self) -> &str {
        &self.gen_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_serializes_json_format() {
        let request = ChatRequest {
            model: "qwen3:8b".to_string(),
            messages: vec![],
            stream: false,
            format: Some(serde_json::json!("json")),
            think: Some(false),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"format\":\"json\""));
        assert!(json.contains("\"think\":false"));
    }

    #[test]
    fn test_chat_request_skips_none_fields() {
        let request = ChatRequest {
            model: "qwen3:8b".to_string(),
            messages: vec![],
            stream: false,
            format: None,
            think: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("format"));
        assert!(!json.contains("think"));
    }

    #[test]
    fn test_backend_defaults() {
        let backend = OllamaBackend::new().unwrap();
        assert_eq!(backend.dimension(), DEFAULT_DIMENSION);
        assert_eq!(EmbeddingBackend::model_name(&backend), DEFAULT_EMBED_MODEL);
        assert_eq!(TagBackend::model_name(&backend), DEFAULT_GEN_MODEL);
    }
}

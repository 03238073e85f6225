
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::{RagError, Result};

/// Vector width of `nomic-embed-text`, the default embedding model.
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Client for the Ollama embeddings API.
///
/// Requests are synchronous under the hood; the [`Embedder`] impl
/// moves them onto the blocking thread pool so callers can stay async.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: Url,
    model: String,
    batch_size: u32,
    dimension: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama
            .ollama_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.ollama.embedding_model.clone(),
            batch_size: config.ollama.batch_size,
            dimension: config.ollama.embedding_dimension as usize,
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Test connection to the Ollama server and verify model availability.
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping()?;
        self.validate_model()?;

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive.
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self.join_url("/api/tags")?;

        debug!("Pinging Ollama server at {}", url);

        self.agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| RagError::Embedding(format!("Failed to ping Ollama server: {e}")))?;

        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that the configured embedding model is available.
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        debug!("Validating model: {}", self.model);

        let models = self.list_models()?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(RagError::Embedding(format!(
                "Model '{}' is not available. Available models: {available:?}",
                self.model
            )))
        }
    }

    /// List all models the server has pulled.
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.join_url("/api/tags")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| RagError::Embedding(format!("Failed to fetch models: {e}")))?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse models response: {e}")))?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Blocking call to `/api/embed` for one batch of texts.
    ///
    /// Response vectors arrive in input order; the count and each
    /// vector's width are checked before the batch is accepted.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RagError::Embedding(format!(
                "Cannot embed empty text (batch position {position})"
            )));
        }

        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let url = self.join_url("/api/embed")?;

        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Embedding(format!("Failed to serialize request: {e}")))?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    RagError::Embedding(format!("Embedding request failed: HTTP {status}"))
                }
                other => RagError::Embedding(format!("Embedding request failed: {other}")),
            })?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Embedding(format!("Failed to parse embedding response: {e}")))?;

        if embed_response.embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                embed_response.embeddings.len()
            )));
        }

        for vector in &embed_response.embeddings {
            if vector.len() != self.dimension {
                return Err(RagError::Embedding(format!(
                    "Model returned {}-dimensional vector, expected {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }

        Ok(embed_response.embeddings)
    }

    /// Blocking batch embedding, split into server-sized sub-batches.
    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            results.extend(self.embed_texts(batch)?);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn join_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Embedding(format!("Failed to build URL for {path}: {e}")))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    #[inline]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let client = self.clone();
        let text = text.to_string();

        let mut vectors =
            tokio::task::spawn_blocking(move || client.embed_texts(std::slice::from_ref(&text)))
                .await
                .map_err(|e| RagError::Embedding(format!("Embedding task failed: {e}")))??;

        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("Server returned no embedding".to_string()))
    }

    #[inline]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || client.embed_all(&texts))
            .await
            .map_err(|e| RagError::Embedding(format!("Embedding task failed: {e}")))?
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }
}

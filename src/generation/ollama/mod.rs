#[cfg(test)]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::generation::Generator;
use crate::{RagError, Result};

/// Generation can take minutes on CPU-only hosts, so the default
/// deadline is far above the embedding timeout.
pub const DEFAULT_GENERATION_TIMEOUT_SECONDS: u64 = 120;

/// Client for the Ollama completion API.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    base_url: Url,
    model: String,
    timeout: Duration,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama
            .ollama_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let timeout = config.ollama.generation_timeout();
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.ollama.generation_model.clone(),
            timeout,
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Validate that the configured generation model is available.
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        debug!("Validating generation model: {}", self.model);

        let url = self.join_url("/api/tags")?;

        let response_text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| RagError::Generation(format!("Failed to fetch models: {e}")))?;

        let models: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Generation(format!("Failed to parse models response: {e}")))?;

        if models.models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available: Vec<&str> = models.models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(RagError::Generation(format!(
                "Model '{}' is not available. Available models: {available:?}",
                self.model
            )))
        }
    }

    /// Blocking call to `/api/generate` with streaming disabled.
    fn generate_text(&self, prompt: &str) -> Result<String> {
        debug!(
            "Requesting completion from {} (prompt length: {})",
            self.model,
            prompt.len()
        );

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let url = self.join_url("/api/generate")?;

        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::Generation(format!("Failed to serialize request: {e}")))?;

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::Timeout(_) => RagError::GenerationTimeout(self.timeout),
                ureq::Error::StatusCode(status) => {
                    RagError::Generation(format!("Generation request failed: HTTP {status}"))
                }
                other => RagError::Generation(format!("Generation request failed: {other}")),
            })?;

        let generate_response: GenerateResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Generation(format!("Failed to parse response: {e}")))?;

        debug!(
            "Received completion ({} chars)",
            generate_response.response.len()
        );

        Ok(generate_response.response)
    }

    fn join_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Generation(format!("Failed to build URL for {path}: {e}")))
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    #[inline]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let client = self.clone();
        let prompt = prompt.to_string();

        tokio::task::spawn_blocking(move || client.generate_text(&prompt))
            .await
            .map_err(|e| RagError::Generation(format!("Generation task failed: {e}")))?
    }
}

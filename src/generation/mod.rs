// Generation module
// Produces answer text from an assembled prompt via a language model server

pub mod ollama;

pub use ollama::{DEFAULT_GENERATION_TIMEOUT_SECONDS, OllamaGenerator};

use async_trait::async_trait;

use crate::Result;

/// Produces completion text for a fully assembled prompt.
///
/// The prompt is the single source of truth: implementations must not
/// consult any external knowledge beyond what the prompt carries.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion. Fails with
    /// [`RagError::GenerationTimeout`](crate::RagError::GenerationTimeout)
    /// when the model does not answer within the configured deadline.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

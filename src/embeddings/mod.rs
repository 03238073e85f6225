// Embeddings module
// Turns text into fixed-dimension vectors via an embedding model server

pub mod ollama;

pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, OllamaEmbedder};

use async_trait::async_trait;

use crate::Result;

/// Produces dense vectors for text.
///
/// Implementations must be deterministic for a given model version:
/// the same input yields the same vector, and batch order is
/// preserved. All vectors from one implementation have the same
/// dimensionality, reported by [`Embedder::dimension`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. Empty input is rejected.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning vectors in input order.
    ///
    /// Fails as a whole if any input cannot be embedded; callers that
    /// want per-item recovery should batch per document.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Width of the vectors this embedder produces.
    fn dimension(&self) -> usize;
}

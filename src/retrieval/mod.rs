// Retrieval module
// Embeds a query and finds the closest indexed chunks


use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::index::{ScoredChunk, VectorIndex};
use crate::Result;

/// Read-only retrieval over the vector index.
///
/// Holds no mutable state, so one retriever can serve any number of
/// concurrent queries. Results are deterministic for a fixed index
/// state and query text.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    max_query_chars: usize,
}

impl Retriever {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k: config.top_k,
            max_query_chars: config.max_query_chars,
        }
    }

    /// Retrieve the configured number of chunks for `query`.
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        self.retrieve_k(query, self.top_k).await
    }

    /// Retrieve up to `k` chunks for `query`, most similar first.
    #[inline]
    pub async fn retrieve_k(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let bounded = self.bounded_query(query);

        debug!("Retrieving top {} chunks for query", k);

        let vector = self.embedder.embed(&bounded).await?;
        let results = self.index.query(&vector, k).await?;

        debug!("Retrieved {} chunks", results.len());
        Ok(results)
    }

    /// Oversized queries are truncated rather than rejected; the
    /// embedding model cannot take unbounded input and a partial
    /// question still retrieves useful context.
    fn bounded_query<'a>(&self, query: &'a str) -> Cow<'a, str> {
        let char_count = query.chars().count();
        if char_count <= self.max_query_chars {
            return Cow::Borrowed(query);
        }

        warn!(
            "Query length {} exceeds {} characters, truncating",
            char_count, self.max_query_chars
        );
        Cow::Owned(query.chars().take(self.max_query_chars).collect())
    }
}

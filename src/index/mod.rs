// Vector index module
// Durable storage and nearest-neighbour retrieval for embedded chunks


pub mod lancedb;
pub mod memory;

pub use lancedb::LanceIndex;
pub use memory::MemoryIndex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::chunking::Chunk;

/// Row stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Stable identity; writes with the same id replace the old row.
    pub chunk_id: String,
    /// The chunk's embedding vector.
    pub vector: Vec<f32>,
    /// The chunk text itself, stored alongside the vector so retrieval
    /// needs no second lookup.
    pub text: String,
    /// Identifier of the document this chunk came from.
    pub source_id: String,
    /// Character offset of the chunk within its document.
    pub offset: u64,
    /// Position of the chunk within its document.
    pub seq: u32,
    /// Timestamp when this entry was created.
    pub created_at: String,
}

impl IndexEntry {
    #[inline]
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.id(),
            vector,
            text: chunk.text.clone(),
            source_id: chunk.source_id.clone(),
            offset: chunk.offset as u64,
            seq: chunk.seq,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Retrieval hit: a stored chunk plus its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub source_id: String,
    pub offset: u64,
    pub seq: u32,
    /// Cosine similarity to the query, higher is closer.
    pub score: f32,
}

/// Sorts hits by similarity descending, breaking ties by chunk id so
/// equal-score results keep a stable order across runs.
pub(crate) fn sort_scored(results: &mut [ScoredChunk]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

/// Durable store of embedded chunks supporting similarity search.
///
/// Implementations must treat `add` as an upsert keyed on `chunk_id`
/// and must tolerate deletes of ids that were never stored. All
/// methods take `&self` so one index handle can serve concurrent
/// readers.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert entries, replacing any existing rows with the same chunk id.
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Remove the given chunk ids. Ids that are not present are ignored.
    async fn delete(&self, chunk_ids: &[String]) -> Result<()>;

    /// Return up to `k` stored chunks closest to `vector`, most
    /// similar first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// All chunk ids currently stored, in no particular order.
    async fn list_ids(&self) -> Result<Vec<String>>;

    /// Number of stored entries.
    async fn count(&self) -> Result<u64>;

    /// Maintenance hook run after a write cycle. Backends that need
    /// no upkeep inherit this no-op.
    async fn optimize(&self) -> Result<()> {
        Ok(())
    }
}


use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{IndexEntry, ScoredChunk, VectorIndex, sort_scored};
use crate::{RagError, Result};

/// In-memory vector index, the reference implementation of the
/// [`VectorIndex`] contract and the store used by unit tests.
///
/// Entries live in a `BTreeMap` keyed by chunk id, so upserts and id
/// listings are deterministic. Not durable.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<BTreeMap<String, IndexEntry>>,
}

/// Cosine similarity of two equal-length vectors. Zero-magnitude
/// vectors compare as zero rather than dividing by zero.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = a
        .iter()
        .zip(b.iter())
        .fold(0.0_f32, |acc, (x, y)| x.mul_add(*y, acc));
    let norm_a = a.iter().fold(0.0_f32, |acc, x| x.mul_add(*x, acc)).sqrt();
    let norm_b = b.iter().fold(0.0_f32, |acc, y| y.mul_add(*y, acc)).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl MemoryIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn read_entries(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, IndexEntry>>> {
        self.entries
            .read()
            .map_err(|_| RagError::IndexUnavailable("Index lock poisoned".to_string()))
    }

    fn write_entries(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, IndexEntry>>> {
        self.entries
            .write()
            .map_err(|_| RagError::IndexUnavailable("Index lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    #[inline]
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut map = self.write_entries()?;

        let expected = map
            .values()
            .next()
            .map_or(entries[0].vector.len(), |e| e.vector.len());
        for entry in &entries {
            if entry.vector.len() != expected {
                return Err(RagError::Embedding(format!(
                    "Entry '{}' has {}-dimensional vector, index expects {expected}",
                    entry.chunk_id,
                    entry.vector.len()
                )));
            }
        }

        for entry in entries {
            map.insert(entry.chunk_id.clone(), entry);
        }
        Ok(())
    }

    #[inline]
    async fn delete(&self, chunk_ids: &[String]) -> Result<()> {
        let mut map = self.write_entries()?;
        for id in chunk_ids {
            map.remove(id);
        }
        Ok(())
    }

    #[inline]
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let map = self.read_entries()?;

        if let Some(first) = map.values().next() {
            if first.vector.len() != vector.len() {
                return Err(RagError::Embedding(format!(
                    "Query vector has {} dimensions, index expects {}",
                    vector.len(),
                    first.vector.len()
                )));
            }
        }

        let mut results: Vec<ScoredChunk> = map
            .values()
            .map(|e| ScoredChunk {
                chunk_id: e.chunk_id.clone(),
                text: e.text.clone(),
                source_id: e.source_id.clone(),
                offset: e.offset,
                seq: e.seq,
                score: cosine_similarity(&e.vector, vector),
            })
            .collect();
        drop(map);

        sort_scored(&mut results);
        results.truncate(k);
        Ok(results)
    }

    #[inline]
    async fn list_ids(&self) -> Result<Vec<String>> {
        let map = self.read_entries()?;
        Ok(map.keys().cloned().collect())
    }

    #[inline]
    async fn count(&self) -> Result<u64> {
        let map = self.read_entries()?;
        Ok(map.len() as u64)
    }
}

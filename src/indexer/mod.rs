// Indexer module
// Runs ingestion cycles that reconcile the vector index with the
// current document set

pub mod consistency;


use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunking::{Chunk, Chunker, SourceDocument, source_of_chunk_id};
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::index::{IndexEntry, VectorIndex};
use crate::{RagError, Result};

pub use consistency::ConsistencyReport;

/// How an ingestion cycle reconciles the index with the document set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStrategy {
    /// Drop every stored entry, then re-chunk and re-embed all
    /// documents. Safe for any kind of change, including edits to
    /// documents the index already holds.
    FullRebuild,
    /// Index documents the index has never seen and delete entries
    /// whose document is gone. Documents already present are left
    /// untouched, so edits to them require a full rebuild.
    Incremental,
}

impl fmt::Display for ReconcileStrategy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullRebuild => write!(f, "full rebuild"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

/// A document the cycle left out of the index, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDocument {
    pub source_id: String,
    pub reason: String,
}

/// Outcome of one ingestion cycle.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub strategy: ReconcileStrategy,
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub documents_removed: usize,
    pub skipped: Vec<SkippedDocument>,
    pub duration: Duration,
}

impl IngestReport {
    /// True when every supplied document made it into the index.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Debug, Default)]
struct CycleOutcome {
    documents_indexed: usize,
    chunks_indexed: usize,
    documents_removed: usize,
    skipped: Vec<SkippedDocument>,
}

/// Drives ingestion cycles against the vector index.
///
/// Cycles are serialized through an internal mutex, so at most one
/// writer touches the index at a time while queries keep running
/// concurrently. A failure on a single document is recorded and the
/// cycle moves on; only an unavailable index aborts the whole cycle.
pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    cycle_lock: Mutex<()>,
}

impl Ingestor {
    /// Create an ingestor from the configured chunking parameters.
    ///
    /// Fails with a configuration error when the chunk overlap is not
    /// smaller than the chunk size.
    #[inline]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        Ok(Self {
            chunker: Chunker::new(config.chunking.clone())?,
            embedder,
            index,
            cycle_lock: Mutex::new(()),
        })
    }

    /// Run one ingestion cycle over `documents`.
    ///
    /// The supplied slice is treated as the complete current document
    /// set: entries for documents that are absent from it are removed
    /// from the index under either strategy.
    #[inline]
    pub async fn ingest(
        &self,
        documents: &[SourceDocument],
        strategy: ReconcileStrategy,
    ) -> Result<IngestReport> {
        let _cycle = self.cycle_lock.lock().await;

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            "Starting {strategy} ingestion run {run_id} over {} documents",
            documents.len()
        );

        let outcome = match strategy {
            ReconcileStrategy::FullRebuild => self.full_rebuild(documents).await?,
            ReconcileStrategy::Incremental => self.incremental(documents).await?,
        };

        if let Err(e) = self.index.optimize().await {
            warn!("Index optimization after ingestion failed: {e}");
        }

        let report = IngestReport {
            run_id,
            strategy,
            documents_indexed: outcome.documents_indexed,
            chunks_indexed: outcome.chunks_indexed,
            documents_removed: outcome.documents_removed,
            skipped: outcome.skipped,
            duration: started.elapsed(),
        };

        info!(
            "Ingestion run {run_id} finished: {} documents indexed ({} chunks), {} removed, {} skipped in {:?}",
            report.documents_indexed,
            report.chunks_indexed,
            report.documents_removed,
            report.skipped.len(),
            report.duration
        );
        Ok(report)
    }

    /// Compare the index contents against `documents` without writing.
    #[inline]
    pub async fn verify_consistency(
        &self,
        documents: &[SourceDocument],
    ) -> Result<ConsistencyReport> {
        let ids = self.index.list_ids().await?;
        Ok(ConsistencyReport::compute(&ids, documents))
    }

    async fn full_rebuild(&self, documents: &[SourceDocument]) -> Result<CycleOutcome> {
        let existing = self.index.list_ids().await?;
        let previous_sources: BTreeSet<&str> = existing
            .iter()
            .filter_map(|id| source_of_chunk_id(id))
            .collect();
        let current_sources: BTreeSet<&str> =
            documents.iter().map(|d| d.source_id.as_str()).collect();

        let mut outcome = CycleOutcome {
            documents_removed: previous_sources
                .iter()
                .filter(|source| !current_sources.contains(*source))
                .count(),
            ..CycleOutcome::default()
        };

        debug!("Dropping {} existing entries for rebuild", existing.len());
        self.index.delete(&existing).await?;

        for document in documents {
            self.process_document(document, &mut outcome).await?;
        }

        Ok(outcome)
    }

    async fn incremental(&self, documents: &[SourceDocument]) -> Result<CycleOutcome> {
        let existing = self.index.list_ids().await?;
        let current_sources: BTreeSet<&str> =
            documents.iter().map(|d| d.source_id.as_str()).collect();

        // Ids whose document has been withdrawn, plus any id that does
        // not carry document provenance at all.
        let stale: Vec<String> = existing
            .iter()
            .filter(|id| {
                source_of_chunk_id(id.as_str())
                    .is_none_or(|source| !current_sources.contains(source))
            })
            .cloned()
            .collect();
        let removed_sources: BTreeSet<&str> = stale
            .iter()
            .filter_map(|id| source_of_chunk_id(id))
            .collect();

        let mut outcome = CycleOutcome {
            documents_removed: removed_sources.len(),
            ..CycleOutcome::default()
        };

        if !stale.is_empty() {
            info!(
                "Removing {} entries from {} withdrawn documents",
                stale.len(),
                outcome.documents_removed
            );
            self.index.delete(&stale).await?;
        }

        let indexed_sources: BTreeSet<&str> = existing
            .iter()
            .filter_map(|id| source_of_chunk_id(id))
            .collect();
        let fresh: Vec<&SourceDocument> = documents
            .iter()
            .filter(|d| !indexed_sources.contains(d.source_id.as_str()))
            .collect();
        debug!(
            "{} of {} documents are new to the index",
            fresh.len(),
            documents.len()
        );

        for document in fresh {
            self.process_document(document, &mut outcome).await?;
        }

        Ok(outcome)
    }

    /// Index one document, folding the result into `outcome`.
    ///
    /// Chunking and embedding failures skip the document; an
    /// unavailable index is fatal for the cycle.
    async fn process_document(
        &self,
        document: &SourceDocument,
        outcome: &mut CycleOutcome,
    ) -> Result<()> {
        match self.index_document(document).await {
            Ok(0) => {
                debug!("Document {} contains no text, nothing to index", document.source_id);
                outcome.skipped.push(SkippedDocument {
                    source_id: document.source_id.clone(),
                    reason: "document contains no text".to_string(),
                });
            }
            Ok(chunk_count) => {
                outcome.documents_indexed += 1;
                outcome.chunks_indexed += chunk_count;
            }
            Err(e @ RagError::IndexUnavailable(_)) => return Err(e),
            Err(e) => {
                warn!("Skipping document {}: {e}", document.source_id);
                outcome.skipped.push(SkippedDocument {
                    source_id: document.source_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Chunk, embed, and store one document. Returns the number of
    /// chunks written.
    async fn index_document(&self, document: &SourceDocument) -> Result<usize> {
        let chunks: Vec<Chunk> = self.chunker.split(document).collect();
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::from_chunk(chunk, vector))
            .collect();

        let written = entries.len();
        self.index.add(entries).await?;
        debug!("Indexed {written} chunks from {}", document.source_id);
        Ok(written)
    }
}

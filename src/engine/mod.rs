// Engine module
// Wires retrieval, prompt assembly, generation, and ingestion into the
// question answering flow


use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::chunking::{SourceDocument, source_of_chunk_id};
use crate::config::Config;
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::generation::{Generator, OllamaGenerator};
use crate::index::{LanceIndex, VectorIndex};
use crate::indexer::{ConsistencyReport, IngestReport, Ingestor, ReconcileStrategy};
use crate::prompt::{ConversationTurn, NOT_FOUND_ANSWER, PromptAssembler};
use crate::retrieval::Retriever;
use crate::Result;

/// An answer together with where it came from.
///
/// `sources` lists the ids of the documents whose chunks were handed
/// to the generator, deduplicated in retrieval rank order. When the
/// generator declined to answer (`grounded` is false) the list is
/// empty, so callers never attribute a non-answer to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerResult {
    pub text: String,
    pub sources: Vec<String>,
    pub grounded: bool,
}

/// A point-in-time view of what the index holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub indexed_chunks: u64,
    /// Source ids with at least one stored chunk, sorted.
    pub documents: Vec<String>,
}

/// The question answering engine.
///
/// Holds the full pipeline behind two entry points: [`ingest`] brings
/// the vector index in line with a document set, and [`answer`] turns
/// a question plus conversation history into a grounded answer.
/// Components are injected, so any embedder, index, or generator
/// implementation can stand in.
///
/// [`ingest`]: RagEngine::ingest
/// [`answer`]: RagEngine::answer
pub struct RagEngine {
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    retriever: Retriever,
    assembler: PromptAssembler,
    ingestor: Ingestor,
}

impl RagEngine {
    /// Assemble an engine from injected components.
    #[inline]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
    ) -> Result<Self> {
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&index),
            &config.retrieval,
        );
        let assembler = PromptAssembler::new(&config.prompt);
        let ingestor = Ingestor::new(config, embedder, Arc::clone(&index))?;

        Ok(Self {
            index,
            generator,
            retriever,
            assembler,
            ingestor,
        })
    }

    /// Assemble the production engine: Ollama models over a LanceDB
    /// index stored under the configured data directory.
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(config)?);
        let generator: Arc<dyn Generator> = Arc::new(OllamaGenerator::new(config)?);
        let index: Arc<dyn VectorIndex> = Arc::new(LanceIndex::new(config).await?);

        Self::new(config, embedder, index, generator)
    }

    /// Answer `question` from the indexed documents.
    ///
    /// Retrieves the closest chunks, assembles the prompt around them
    /// and the recent `history`, and invokes the generator. The
    /// generator is invoked even when retrieval comes back empty; with
    /// no context to work from it is instructed to decline.
    #[inline]
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<AnswerResult> {
        let chunks = self.retriever.retrieve(question).await?;
        debug!("Retrieved {} chunks for the question", chunks.len());

        let prompt = self.assembler.build_prompt(&chunks, history, question);
        let raw = self.generator.generate(&prompt).await?;
        let text = raw.trim().to_string();

        // The prompt pins the exact refusal phrase, but generators
        // sometimes wrap it in extra words; a substring match catches
        // those as well.
        let grounded = !text.contains(NOT_FOUND_ANSWER);

        let mut seen = BTreeSet::new();
        let mut sources = Vec::new();
        if grounded {
            for chunk in &chunks {
                if seen.insert(chunk.source_id.as_str()) {
                    sources.push(chunk.source_id.clone());
                }
            }
        }

        info!(
            "Answered with {} source documents (grounded: {grounded})",
            sources.len()
        );
        Ok(AnswerResult {
            text,
            sources,
            grounded,
        })
    }

    /// Reconcile the index with `documents` using `strategy`.
    #[inline]
    pub async fn ingest(
        &self,
        documents: &[SourceDocument],
        strategy: ReconcileStrategy,
    ) -> Result<IngestReport> {
        self.ingestor.ingest(documents, strategy).await
    }

    /// Compare the index contents against `documents` without writing.
    #[inline]
    pub async fn verify_consistency(
        &self,
        documents: &[SourceDocument],
    ) -> Result<ConsistencyReport> {
        self.ingestor.verify_consistency(documents).await
    }

    /// Report what the index currently holds.
    #[inline]
    pub async fn status(&self) -> Result<EngineStatus> {
        let ids = self.index.list_ids().await?;
        let documents: BTreeSet<&str> = ids
            .iter()
            .filter_map(|id| source_of_chunk_id(id))
            .collect();

        Ok(EngineStatus {
            indexed_chunks: ids.len() as u64,
            documents: documents.iter().map(|source| (*source).to_string()).collect(),
        })
    }
}

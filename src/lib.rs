use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Document load error: {0}")]
    Load(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod generation;
pub mod index;
pub mod indexer;
pub mod prompt;
pub mod retrieval;


use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// A document presented for ingestion: a stable source id (usually the
/// file name) and its full plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub source_id: String,
    pub text: String,
}

impl SourceDocument {
    #[inline]
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// Window sizes are measured in characters, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

/// A contiguous slice of a document, at most `chunk_size` characters,
/// carrying its starting character offset and position in the split.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source_id: String,
    pub offset: usize,
    pub seq: u32,
}

impl Chunk {
    /// Stable identifier, unique within the collection for as long as
    /// the chunk exists. Embeds provenance so reconciliation can group
    /// ids by source without a side table.
    #[inline]
    pub fn id(&self) -> String {
        chunk_id(&self.source_id, self.seq)
    }
}

#[inline]
pub fn chunk_id(source_id: &str, seq: u32) -> String {
    format!("{source_id}#{seq}")
}

/// Recover the source id from a chunk id. Returns `None` for ids that
/// were not produced by [`chunk_id`].
#[inline]
pub fn source_of_chunk_id(id: &str) -> Option<&str> {
    id.rsplit_once('#').map(|(source, _)| source)
}

/// Split a chunk id back into its source id and sequence number.
#[inline]
pub fn parse_chunk_id(id: &str) -> Option<(&str, u32)> {
    let (source, seq) = id.rsplit_once('#')?;
    Some((source, seq.parse().ok()?))
}

/// Splits documents into overlapping character windows, preferring to
/// cut at natural boundaries. Cut precedence: paragraph break, then
/// sentence end, then word boundary, then a hard cut at the window
/// edge. A natural cut is only taken while it still clears the overlap
/// region, so the scan always moves forward.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(RagError::Config("chunk size must be positive".to_string()));
        }
        if config.overlap >= config.chunk_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                config.overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    #[inline]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Lazily split `document` into chunks. The iterator is finite,
    /// has no side effects, and a fresh call restarts from the top.
    /// Chunks are exact substrings: consecutive chunks share exactly
    /// `overlap` characters, so concatenating chunk 0 with every later
    /// chunk minus its first `overlap` characters reconstructs the
    /// document. The empty document yields no chunks.
    #[inline]
    pub fn split<'a>(&self, document: &'a SourceDocument) -> ChunkIter<'a> {
        debug!(
            source_id = %document.source_id,
            chars = document.text.chars().count(),
            "Splitting document into chunks"
        );
        ChunkIter::new(
            &document.text,
            &document.source_id,
            self.config.chunk_size,
            self.config.overlap,
        )
    }
}

/// Lazy chunk sequence over a single document.
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    text: &'a str,
    source_id: &'a str,
    /// Byte offset of each character, plus the text length as a
    /// final sentinel entry. Indexing is by character throughout.
    byte_offsets: Vec<usize>,
    chars: Vec<char>,
    chunk_size: usize,
    overlap: usize,
    pos: usize,
    seq: u32,
    done: bool,
}

impl<'a> ChunkIter<'a> {
    fn new(text: &'a str, source_id: &'a str, chunk_size: usize, overlap: usize) -> Self {
        let mut byte_offsets = Vec::with_capacity(text.len() + 1);
        let mut chars = Vec::with_capacity(text.len());
        for (byte, ch) in text.char_indices() {
            byte_offsets.push(byte);
            chars.push(ch);
        }
        byte_offsets.push(text.len());

        Self {
            text,
            source_id,
            byte_offsets,
            chars,
            chunk_size,
            overlap,
            pos: 0,
            seq: 0,
            done: false,
        }
    }

    fn total_chars(&self) -> usize {
        self.chars.len()
    }

    /// Pick the cut for the window starting at `start`, where
    /// `hard_end` is strictly inside the document. Candidates are
    /// exclusive end positions; the earliest acceptable cut is one
    /// past the overlap region so the next window starts after this
    /// one.
    fn find_cut(&self, start: usize, hard_end: usize) -> usize {
        let min_cut = start + self.overlap + 1;

        for end in (min_cut..=hard_end).rev() {
            if self.is_paragraph_cut(end) {
                return end;
            }
        }
        for end in (min_cut..=hard_end).rev() {
            if self.is_sentence_cut(end) {
                return end;
            }
        }
        for end in (min_cut..=hard_end).rev() {
            if self.chars[end].is_whitespace() {
                return end;
            }
        }
        hard_end
    }

    /// The window would end just after a blank line.
    fn is_paragraph_cut(&self, end: usize) -> bool {
        end >= 2 && self.chars[end - 1] == '\n' && self.chars[end - 2] == '\n'
    }

    /// The window would end just after sentence punctuation that is
    /// followed by whitespace.
    fn is_sentence_cut(&self, end: usize) -> bool {
        end >= 1
            && matches!(self.chars[end - 1], '.' | '!' | '?')
            && self.chars.get(end).is_some_and(|c| c.is_whitespace())
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        let byte_start = self.byte_offsets[start];
        let byte_end = self.byte_offsets[end];
        self.text.get(byte_start..byte_end).unwrap_or("")
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = Chunk;

    #[inline]
    fn next(&mut self) -> Option<Chunk> {
        if self.done || self.pos >= self.total_chars() {
            self.done = true;
            return None;
        }

        let start = self.pos;
        let hard_end = (start + self.chunk_size).min(self.total_chars());
        let end = if hard_end < self.total_chars() {
            self.find_cut(start, hard_end)
        } else {
            hard_end
        };

        let chunk = Chunk {
            text: self.slice(start, end).to_string(),
            source_id: self.source_id.to_string(),
            offset: start,
            seq: self.seq,
        };
        self.seq += 1;

        if end >= self.total_chars() {
            self.done = true;
        } else {
            self.pos = end - self.overlap;
        }

        Some(chunk)
    }
}

/// Rough token estimate for budget checks against embedding models.
/// English text averages around 0.75 words per token; punctuation adds
/// a little on top.
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    let punctuation_count = text
        .chars()
        .filter(|c| c.is_ascii_punctuation())
        .count();

    let estimated = (word_count as f64 / 0.75) + (punctuation_count as f64 * 0.1);
    estimated.ceil() as usize
}

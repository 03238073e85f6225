// Consistency validation module
// Compares what the vector index holds against the current document set

use std::collections::{BTreeMap, BTreeSet};

use crate::chunking::{SourceDocument, parse_chunk_id};

/// Result of checking the index against the document set.
///
/// Stored chunk ids carry their provenance, so the check works from
/// [`crate::index::VectorIndex::list_ids`] alone; nothing is
/// re-chunked or re-embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of entries in the index
    pub index_entries: usize,
    /// Number of documents expected to have entries
    pub expected_documents: usize,
    /// Source ids of documents with no entries in the index
    pub missing_documents: Vec<String>,
    /// Source ids found in the index with no matching document. Ids
    /// without parsable provenance are reported verbatim.
    pub orphaned_sources: Vec<String>,
    /// Documents whose stored chunks have sequence gaps
    pub fragmented_documents: Vec<DocumentConsistencyIssue>,
    /// Overall consistency status
    pub is_consistent: bool,
}

/// Consistency issue for a specific document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConsistencyIssue {
    pub source_id: String,
    pub stored_chunks: usize,
    pub missing_seqs: Vec<u32>,
}

impl ConsistencyReport {
    /// Build a report from the stored chunk ids and the documents that
    /// should be indexed.
    ///
    /// Empty documents never produce chunks, so they are not expected
    /// to appear in the index. A sequence gap inside a document means
    /// only part of it survived; chunks missing past the highest
    /// stored sequence number are not detectable without re-chunking.
    #[inline]
    pub fn compute(index_ids: &[String], documents: &[SourceDocument]) -> Self {
        let mut stored: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
        let mut malformed: BTreeSet<String> = BTreeSet::new();
        for id in index_ids {
            match parse_chunk_id(id) {
                Some((source, seq)) => {
                    stored.entry(source.to_string()).or_default().insert(seq);
                }
                None => {
                    malformed.insert(id.clone());
                }
            }
        }

        let expected: BTreeSet<&str> = documents
            .iter()
            .filter(|document| !document.text.is_empty())
            .map(|document| document.source_id.as_str())
            .collect();

        let missing_documents: Vec<String> = expected
            .iter()
            .filter(|source| !stored.contains_key(**source))
            .map(|source| (*source).to_string())
            .collect();

        let mut orphaned_sources: Vec<String> = stored
            .keys()
            .filter(|source| !expected.contains(source.as_str()))
            .cloned()
            .collect();
        orphaned_sources.extend(malformed);
        orphaned_sources.sort();

        let fragmented_documents: Vec<DocumentConsistencyIssue> = stored
            .iter()
            .filter_map(|(source, seqs)| {
                let highest = seqs.last().copied()?;
                let missing_seqs: Vec<u32> =
                    (0..=highest).filter(|seq| !seqs.contains(seq)).collect();
                (!missing_seqs.is_empty()).then(|| DocumentConsistencyIssue {
                    source_id: source.clone(),
                    stored_chunks: seqs.len(),
                    missing_seqs,
                })
            })
            .collect();

        let is_consistent = missing_documents.is_empty()
            && orphaned_sources.is_empty()
            && fragmented_documents.is_empty();

        Self {
            index_entries: index_ids.len(),
            expected_documents: expected.len(),
            missing_documents,
            orphaned_sources,
            fragmented_documents,
            is_consistent,
        }
    }

    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Index is consistent: {} entries covering {} documents",
                self.index_entries, self.expected_documents
            )
        } else {
            format!(
                "Index inconsistencies found: {} documents missing, {} orphaned sources, {} fragmented documents",
                self.missing_documents.len(),
                self.orphaned_sources.len(),
                self.fragmented_documents.len()
            )
        }
    }

    /// Get the total number of consistency issues
    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_documents.len() + self.orphaned_sources.len() + self.fragmented_documents.len()
    }
}

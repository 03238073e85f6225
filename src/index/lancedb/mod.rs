
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase, Select},
};
use tracing::{debug, error, info, warn};

use super::{IndexEntry, ScoredChunk, VectorIndex, sort_scored};
use crate::config::Config;
use crate::{RagError, Result};

/// Deletes are issued as `chunk_id IN (...)` predicates; large id sets
/// are split so no single predicate grows unbounded.
const DELETE_BATCH_SIZE: usize = 512;

/// Smallest table for which ANN index training is worthwhile (and
/// possible; LanceDB needs enough rows to train the quantizer).
const VECTOR_INDEX_MIN_ROWS: u64 = 256;

/// Durable vector index backed by LanceDB.
///
/// Every mutation is a single LanceDB commit, so concurrent readers
/// see either the previous or the new table version, never a partial
/// write.
pub struct LanceIndex {
    connection: Connection,
    table_name: String,
    dimension: usize,
}

impl LanceIndex {
    /// Open (or create) the index under the configured data directory.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::IndexUnavailable(format!(
                    "Failed to create vector database directory: {e}"
                ))
            })?;
        }

        let uri = format!("file://{}", db_path.display());

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(&db_path)?;

                    lancedb::connect(&uri).execute().await.map_err(|e| {
                        RagError::IndexUnavailable(format!(
                            "Failed to connect to LanceDB after recovery: {e}"
                        ))
                    })?
                } else {
                    return Err(RagError::IndexUnavailable(format!(
                        "Failed to connect to LanceDB: {e}"
                    )));
                }
            }
        };

        let store = Self {
            connection,
            table_name: "chunks".to_string(),
            dimension: config.ollama.embedding_dimension as usize,
        };

        store.initialize_table_with_recovery().await?;

        info!("Vector index initialized successfully");
        Ok(store)
    }

    /// Create the chunks table if missing, or recreate it when the
    /// stored vector width no longer matches the configured one.
    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to list tables: {e}")))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_vector_dimension().await?;
            if existing == self.dimension {
                debug!("Chunks table already exists with {} dimensions", existing);
                return Ok(());
            }

            warn!(
                "Vector dimension changed from {} to {}, recreating table",
                existing, self.dimension
            );
            self.drop_table_if_exists().await?;
        }

        self.connection
            .create_empty_table(&self.table_name, self.create_schema())
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to create table: {e}")))?;

        info!(
            "Chunks table created with {} dimensions",
            self.dimension
        );
        Ok(())
    }

    async fn initialize_table_with_recovery(&self) -> Result<()> {
        match self.initialize_table().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("schema")
                {
                    warn!("Table corruption detected during initialization: {}", e);

                    if let Err(drop_err) = self.drop_table_if_exists().await {
                        warn!("Failed to drop corrupted table: {}", drop_err);
                    }

                    self.initialize_table().await.map_err(|e| {
                        RagError::IndexUnavailable(format!(
                            "Failed to recreate table after corruption: {e}"
                        ))
                    })
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Read the vector column width from the existing table schema.
    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to get table schema: {e}")))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(RagError::IndexUnavailable(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("source_id", DataType::Utf8, false),
            Field::new("char_offset", DataType::UInt64, false),
            Field::new("seq", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to open table: {e}")))
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| {
                RagError::IndexUnavailable(format!("Failed to list tables for drop: {e}"))
            })?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing chunks table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::IndexUnavailable(format!("Failed to drop table: {e}")))?;
        }

        Ok(())
    }

    fn create_record_batch(&self, entries: &[IndexEntry]) -> Result<RecordBatch> {
        let len = entries.len();

        let mut chunk_ids = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut source_ids = Vec::with_capacity(len);
        let mut offsets = Vec::with_capacity(len);
        let mut seqs = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for entry in entries {
            chunk_ids.push(entry.chunk_id.as_str());
            texts.push(entry.text.as_str());
            source_ids.push(entry.source_id.as_str());
            offsets.push(entry.offset);
            seqs.push(entry.seq);
            created_ats.push(entry.created_at.as_str());
        }

        let mut flat_values = Vec::with_capacity(len * self.dimension);
        for entry in entries {
            flat_values.extend_from_slice(&entry.vector);
        }
        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| RagError::IndexUnavailable(format!("Failed to create vector array: {e}")))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(chunk_ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(source_ids)),
            Arc::new(UInt64Array::from(offsets)),
            Arc::new(UInt32Array::from(seqs)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to create record batch: {e}")))
    }

    /// Build a `chunk_id IN (...)` predicate, escaping embedded quotes.
    fn id_predicate(chunk_ids: &[String]) -> String {
        let quoted = chunk_ids
            .iter()
            .map(|id| format!("'{}'", id.replace('\'', "''")))
            .join(", ");
        format!("chunk_id IN ({quoted})")
    }

    fn parse_query_batch(&self, batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
        let num_rows = batch.num_rows();
        let mut results = Vec::with_capacity(num_rows);

        let chunk_ids = Self::string_column(batch, "chunk_id")?;
        let texts = Self::string_column(batch, "text")?;
        let source_ids = Self::string_column(batch, "source_id")?;

        let offsets = batch
            .column_by_name("char_offset")
            .ok_or_else(|| RagError::IndexUnavailable("Missing char_offset column".to_string()))?
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| {
                RagError::IndexUnavailable("Invalid char_offset column type".to_string())
            })?;

        let seqs = batch
            .column_by_name("seq")
            .ok_or_else(|| RagError::IndexUnavailable("Missing seq column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| RagError::IndexUnavailable("Invalid seq column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .map(|col| col.as_any().downcast_ref::<Float32Array>());

        for row in 0..num_rows {
            let distance = distances
                .flatten()
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            // Cosine distance is 1 - cosine similarity.
            results.push(ScoredChunk {
                chunk_id: chunk_ids.value(row).to_string(),
                text: texts.value(row).to_string(),
                source_id: source_ids.value(row).to_string(),
                offset: offsets.value(row),
                seq: seqs.value(row),
                score: 1.0 - distance,
            });
        }

        Ok(results)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| RagError::IndexUnavailable(format!("Missing {name} column")))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| RagError::IndexUnavailable(format!("Invalid {name} column type")))
    }

    /// Build an approximate-nearest-neighbour index on the vector
    /// column. Requires enough rows for training, so [`VectorIndex::optimize`]
    /// gates this on table size.
    #[inline]
    pub async fn create_vector_index(&self) -> Result<()> {
        debug!("Creating vector index for improved search performance");

        let table = self.open_table().await?;

        table
            .create_index(&["vector"], lancedb::index::Index::Auto)
            .execute()
            .await
            .map_err(|e| {
                RagError::IndexUnavailable(format!("Failed to create vector index: {e}"))
            })?;

        info!("Vector index created successfully");
        Ok(())
    }

    /// Check whether the table can be opened and counted.
    #[inline]
    pub async fn validate_integrity(&self) -> Result<bool> {
        debug!("Validating index integrity");

        let table_names = match self.connection.table_names().execute().await {
            Ok(names) => names,
            Err(e) => {
                error!("Failed to list tables during integrity check: {}", e);
                return Ok(false);
            }
        };

        if !table_names.contains(&self.table_name) {
            warn!("Chunks table missing during integrity check");
            return Ok(false);
        }

        match self.connection.open_table(&self.table_name).execute().await {
            Ok(table) => match table.count_rows(None).await {
                Ok(count) => {
                    debug!("Integrity check passed, {} rows found", count);
                    Ok(true)
                }
                Err(e) => {
                    error!("Failed to count rows during integrity check: {}", e);
                    Ok(false)
                }
            },
            Err(e) => {
                error!("Failed to open table during integrity check: {}", e);
                Ok(false)
            }
        }
    }

    fn attempt_corruption_recovery(db_path: &PathBuf) -> Result<()> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        if db_path.exists() {
            std::fs::remove_dir_all(db_path).map_err(|e| {
                RagError::IndexUnavailable(format!("Failed to remove corrupted database: {e}"))
            })?;
        }

        info!("Database corruption recovery completed");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LanceIndex {
    #[inline]
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            debug!("No entries to store");
            return Ok(());
        }

        for entry in &entries {
            if entry.vector.len() != self.dimension {
                return Err(RagError::Embedding(format!(
                    "Entry '{}' has {}-dimensional vector, index expects {}",
                    entry.chunk_id,
                    entry.vector.len(),
                    self.dimension
                )));
            }
        }

        debug!("Upserting batch of {} entries", entries.len());

        // Upsert: drop any rows that share an incoming chunk id, then
        // append the new rows. Each step is one LanceDB commit.
        let ids: Vec<String> = entries.iter().map(|e| e.chunk_id.clone()).collect();
        self.delete(&ids).await?;

        let record_batch = self.create_record_batch(&entries)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to insert entries: {e}")))?;

        info!("Stored {} entries", entries.len());
        Ok(())
    }

    #[inline]
    async fn delete(&self, chunk_ids: &[String]) -> Result<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }

        debug!("Deleting {} chunk ids", chunk_ids.len());

        let table = self.open_table().await?;

        for batch in chunk_ids.chunks(DELETE_BATCH_SIZE) {
            let predicate = Self::id_predicate(batch);
            table
                .delete(&predicate)
                .await
                .map_err(|e| RagError::IndexUnavailable(format!("Failed to delete entries: {e}")))?;
        }

        Ok(())
    }

    #[inline]
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        if vector.len() != self.dimension {
            return Err(RagError::Embedding(format!(
                "Query vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimension
            )));
        }

        debug!("Searching for similar vectors with limit: {}", k);

        let table = self.open_table().await?;

        let query = table
            .vector_search(vector)
            .map_err(|e| {
                RagError::IndexUnavailable(format!("Failed to create vector search: {e}"))
            })?
            .distance_type(DistanceType::Cosine)
            .column("vector")
            .limit(k);

        let mut stream = query
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to execute search: {e}")))?;

        let mut results = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| {
            RagError::IndexUnavailable(format!("Failed to read result stream: {e}"))
        })? {
            results.extend(self.parse_query_batch(&batch)?);
        }

        // LanceDB orders by distance already; re-sorting pins down the
        // order of equal-score hits.
        sort_scored(&mut results);
        results.truncate(k);

        debug!("Query returned {} results", results.len());
        Ok(results)
    }

    #[inline]
    async fn list_ids(&self) -> Result<Vec<String>> {
        let table = self.open_table().await?;

        let mut stream = table
            .query()
            .select(Select::columns(&["chunk_id"]))
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to list chunk ids: {e}")))?;

        let mut ids = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(|e| {
            RagError::IndexUnavailable(format!("Failed to read id stream: {e}"))
        })? {
            let chunk_ids = Self::string_column(&batch, "chunk_id")?;
            for row in 0..batch.num_rows() {
                ids.push(chunk_ids.value(row).to_string());
            }
        }

        debug!("Index holds {} chunk ids", ids.len());
        Ok(ids)
    }

    #[inline]
    async fn count(&self) -> Result<u64> {
        let table = self.open_table().await?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to count rows: {e}")))?;

        Ok(count as u64)
    }

    #[inline]
    async fn optimize(&self) -> Result<()> {
        debug!("Optimizing vector index");

        let table = self.open_table().await?;

        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to optimize table: {e}")))?;

        // ANN training needs a minimum number of rows; small tables
        // stay on brute-force search.
        let rows = self.count().await?;
        if rows >= VECTOR_INDEX_MIN_ROWS {
            if let Err(e) = self.create_vector_index().await {
                warn!("Skipping vector index creation: {}", e);
            }
        }

        info!("Vector index optimization completed");
        Ok(())
    }
}

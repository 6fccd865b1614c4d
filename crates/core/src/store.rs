use crate::models::{BatchFailure, EmbeddingRecord, QueryMatch, UpsertReport, VectorStoreEntry};
use crate::traits::VectorIndex;
use crate::StoreError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-call vector limit of the managed store.
pub const UPSERT_BATCH_SIZE: usize = 100;

pub struct VectorStoreAdapter<V> {
    index: Arc<V>,
    dimension: usize,
    batch_size: usize,
}

impl<V> Clone for VectorStoreAdapter<V> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            dimension: self.dimension,
            batch_size: self.batch_size,
        }
    }
}

impl<V> VectorStoreAdapter<V>
where
    V: VectorIndex,
{
    pub fn new(index: Arc<V>, dimension: usize) -> Self {
        Self {
            index,
            dimension,
            batch_size: UPSERT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn index(&self) -> &Arc<V> {
        &self.index
    }

    /// Writes `records` in batches. Ids are `chunk-<position in records>`, so
    /// re-running with the same chunking overwrites instead of duplicating.
    /// A failing batch is recorded and the remaining batches still run; only
    /// errors that doom every batch are returned as `Err`.
    pub async fn upsert(
        &self,
        namespace: &str,
        records: &[EmbeddingRecord],
    ) -> Result<UpsertReport, StoreError> {
        if let Some(bad) = records
            .iter()
            .find(|record| record.vector.len() != self.dimension)
        {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.vector.len(),
            });
        }

        let entries: Vec<VectorStoreEntry> = records
            .iter()
            .enumerate()
            .map(|(global_index, record)| VectorStoreEntry::from_record(global_index, record))
            .collect();

        let mut report = UpsertReport {
            stored_count: 0,
            total_count: entries.len(),
            errors: Vec::new(),
        };

        for (batch, slice) in entries.chunks(self.batch_size).enumerate() {
            match self.index.upsert_entries(namespace, slice).await {
                Ok(written) => {
                    debug!(namespace, batch, written, "upserted batch");
                    report.stored_count += slice.len();
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(namespace, batch, %error, "upsert batch failed");
                    report.errors.push(BatchFailure {
                        batch,
                        error: error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    pub async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.index.query(namespace, vector, top_k).await
    }
}

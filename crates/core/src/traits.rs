use crate::models::{IndexDescriptor, IndexStats, QueryMatch, VectorStoreEntry};
use crate::StoreError;
use async_trait::async_trait;

/// Namespace-scoped data plane of a vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// One write call; callers keep `entries` within the store's per-call limit.
    async fn upsert_entries(
        &self,
        namespace: &str,
        entries: &[VectorStoreEntry],
    ) -> Result<usize, StoreError>;

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError>;
}

/// Index-level control plane.
#[async_trait]
pub trait IndexAdmin: Send + Sync {
    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescriptor>, StoreError>;

    /// Answers `StoreError::AlreadyExists` when the name is taken.
    async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<(), StoreError>;

    async fn delete_index(&self, name: &str) -> Result<(), StoreError>;

    async fn describe_stats(&self) -> Result<IndexStats, StoreError>;
}

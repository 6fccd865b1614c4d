use crate::models::{IndexDescriptor, IndexStats, QueryMatch, VectorStoreEntry};
use crate::traits::{IndexAdmin, VectorIndex};
use crate::StoreError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    index: Option<IndexDescriptor>,
    namespaces: BTreeMap<String, BTreeMap<String, VectorStoreEntry>>,
    upsert_calls: usize,
}

/// Process-local index with namespaces and cosine scoring.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(name: impl Into<String>, dimension: usize) -> Self {
        let store = Self::default();
        store.lock().index = Some(IndexDescriptor::cosine(name, dimension));
        store
    }

    pub fn ids(&self, namespace: &str) -> BTreeSet<String> {
        self.lock()
            .namespaces
            .get(namespace)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn upsert_calls(&self) -> usize {
        self.lock().upsert_calls
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ready_dimension(state: &State) -> Result<usize, StoreError> {
    state
        .index
        .as_ref()
        .map(|index| index.dimension)
        .ok_or_else(|| StoreError::NotReady("in-memory index has not been created".to_string()))
}

fn cosine(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn upsert_entries(
        &self,
        namespace: &str,
        entries: &[VectorStoreEntry],
    ) -> Result<usize, StoreError> {
        let mut state = self.lock();
        let dimension = ready_dimension(&state)?;
        if let Some(bad) = entries.iter().find(|entry| entry.values.len() != dimension) {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.values.len(),
            });
        }

        state.upsert_calls += 1;
        let stored = state.namespaces.entry(namespace.to_string()).or_default();
        for entry in entries {
            stored.insert(entry.id.clone(), entry.clone());
        }
        Ok(entries.len())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let state = self.lock();
        let dimension = ready_dimension(&state)?;
        if vector.len() != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }

        let entries = state
            .namespaces
            .get(namespace)
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))?;

        let mut matches: Vec<QueryMatch> = entries
            .values()
            .map(|entry| QueryMatch {
                id: entry.id.clone(),
                score: cosine(&entry.values, vector),
                metadata: Some(entry.metadata.clone()),
            })
            .collect();
        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[async_trait]
impl IndexAdmin for InMemoryStore {
    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescriptor>, StoreError> {
        Ok(self
            .lock()
            .index
            .as_ref()
            .filter(|index| index.name == name)
            .cloned())
    }

    async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(existing) = &state.index {
            return Err(StoreError::AlreadyExists(existing.name.clone()));
        }
        state.index = Some(descriptor.clone());
        state.namespaces.clear();
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.index.as_ref().is_some_and(|index| index.name == name) {
            state.index = None;
            state.namespaces.clear();
        }
        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats, StoreError> {
        let state = self.lock();
        let dimension = ready_dimension(&state)?;
        let namespaces: BTreeMap<String, u64> = state
            .namespaces
            .iter()
            .map(|(name, entries)| (name.clone(), entries.len() as u64))
            .collect();

        Ok(IndexStats {
            dimension,
            total_vector_count: namespaces.values().sum(),
            namespaces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    fn entry(id: &str, values: Vec<f32>) -> VectorStoreEntry {
        VectorStoreEntry {
            id: id.to_string(),
            values,
            metadata: ChunkMetadata {
                text: id.to_string(),
                chunk_index: 0,
            },
        }
    }

    #[tokio::test]
    async fn unknown_namespace_is_reported_as_absent() {
        let store = InMemoryStore::with_index("docs", 2);
        let result = store.query("nobody", &[1.0, 0.0], 1).await;
        assert!(matches!(result, Err(StoreError::NamespaceNotFound(_))));
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = InMemoryStore::with_index("docs", 2);
        store
            .upsert_entries("alice", &[entry("chunk-0", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert_entries("bob", &[entry("chunk-0", vec![0.0, 1.0])])
            .await
            .unwrap();

        let alice = store.query("alice", &[0.0, 1.0], 5).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].score, 0.0);

        let stats = store.describe_stats().await.unwrap();
        assert_eq!(stats.total_vector_count, 2);
        assert_eq!(stats.namespaces.get("bob"), Some(&1));
    }

    #[tokio::test]
    async fn data_calls_fail_until_index_exists() {
        let store = InMemoryStore::new();
        let result = store.upsert_entries("alice", &[entry("chunk-0", vec![1.0])]).await;
        assert!(matches!(result, Err(StoreError::NotReady(_))));

        store
            .create_index(&IndexDescriptor::cosine("docs", 1))
            .await
            .unwrap();
        assert!(store
            .upsert_entries("alice", &[entry("chunk-0", vec![1.0])])
            .await
            .is_ok());

        let again = store.create_index(&IndexDescriptor::cosine("docs", 1)).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn delete_drops_all_namespaces() {
        let store = InMemoryStore::with_index("docs", 1);
        store
            .upsert_entries("alice", &[entry("chunk-0", vec![1.0])])
            .await
            .unwrap();

        store.delete_index("docs").await.unwrap();

        assert_eq!(store.describe_index("docs").await.unwrap(), None);
        assert!(store.ids("alice").is_empty());
    }
}

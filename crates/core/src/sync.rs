use crate::models::SyncReport;
use crate::traits::VectorIndex;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers which candidate namespaces already hold vectors.
#[async_trait]
pub trait NamespaceSyncChecker: Send + Sync {
    async fn indexed_namespaces(&self, candidates: &[String]) -> Vec<String>;

    async fn check_sync(&self, candidates: &[String]) -> SyncReport {
        let indexed = self.indexed_namespaces(candidates).await;
        let missing = candidates
            .iter()
            .filter(|candidate| !indexed.contains(*candidate))
            .cloned()
            .collect();
        SyncReport { indexed, missing }
    }
}

/// Infers existence with a top-1 query using an all-zero probe vector, for
/// stores that cannot list their namespaces. One query per candidate; a read
/// error or an empty result both mean "absent".
pub struct ProbeQueryChecker<V> {
    index: Arc<V>,
    dimension: usize,
}

impl<V> ProbeQueryChecker<V>
where
    V: VectorIndex,
{
    pub fn new(index: Arc<V>, dimension: usize) -> Self {
        Self { index, dimension }
    }

    pub async fn has_vectors(&self, namespace: &str) -> bool {
        let probe = vec![0.0f32; self.dimension];
        match self.index.query(namespace, &probe, 1).await {
            Ok(matches) => !matches.is_empty(),
            Err(error) => {
                debug!(namespace, %error, "probe query failed, namespace treated as absent");
                false
            }
        }
    }
}

#[async_trait]
impl<V> NamespaceSyncChecker for ProbeQueryChecker<V>
where
    V: VectorIndex,
{
    async fn indexed_namespaces(&self, candidates: &[String]) -> Vec<String> {
        let mut indexed = Vec::new();
        for candidate in candidates {
            if indexed.contains(candidate) {
                continue;
            }
            if self.has_vectors(candidate).await {
                indexed.push(candidate.clone());
            } else {
                warn!(namespace = %candidate, "namespace has no stored vectors");
            }
        }
        indexed
    }
}

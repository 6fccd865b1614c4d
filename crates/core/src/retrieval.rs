use crate::embeddings::{Embedder, EmbeddingGenerator};
use crate::models::{QueryMatch, RetrievedChunk, RetrievedContext};
use crate::store::VectorStoreAdapter;
use crate::traits::VectorIndex;
use crate::RetrievalError;
use std::sync::Arc;
use tracing::debug;

/// Embeds a question and pulls the closest chunks; answer generation happens elsewhere.
pub struct RetrievalOrchestrator<E, V> {
    embeddings: EmbeddingGenerator<E>,
    store: VectorStoreAdapter<V>,
    model: String,
}

impl<E, V> RetrievalOrchestrator<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    pub fn new(embedder: Arc<E>, store: Arc<V>, model: impl Into<String>) -> Self {
        let dimension = embedder.dimensions();
        Self {
            embeddings: EmbeddingGenerator::new(embedder),
            store: VectorStoreAdapter::new(store, dimension),
            model: model.into(),
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        namespace: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, RetrievalError> {
        if top_k == 0 {
            return Err(RetrievalError::ZeroTopK);
        }
        let vector = self.embed_query(query).await?;
        let matches = self.store.query(namespace, &vector, top_k).await?;
        debug!(namespace, top_k, hits = matches.len(), "retrieved chunks");

        Ok(RetrievedContext {
            query: query.to_string(),
            chunks: into_chunks(namespace, matches),
        })
    }

    /// Queries each namespace with the same embedding and keeps the best `top_k` overall.
    pub async fn retrieve_across(
        &self,
        query: &str,
        namespaces: &[String],
        top_k: usize,
    ) -> Result<RetrievedContext, RetrievalError> {
        if top_k == 0 {
            return Err(RetrievalError::ZeroTopK);
        }
        let vector = self.embed_query(query).await?;

        let mut chunks = Vec::new();
        for namespace in namespaces {
            let matches = self.store.query(namespace, &vector, top_k).await?;
            chunks.extend(into_chunks(namespace, matches));
        }

        chunks.sort_by(|left, right| right.score.total_cmp(&left.score));
        chunks.truncate(top_k);

        Ok(RetrievedContext {
            query: query.to_string(),
            chunks,
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        Ok(self.embeddings.embed_one(query, &self.model).await?)
    }
}

fn into_chunks(namespace: &str, matches: Vec<QueryMatch>) -> Vec<RetrievedChunk> {
    matches
        .into_iter()
        .map(|item| {
            let (text, chunk_index) = match item.metadata {
                Some(metadata) => (metadata.text, Some(metadata.chunk_index)),
                None => (String::new(), None),
            };
            RetrievedChunk {
                namespace: namespace.to_string(),
                id: item.id,
                chunk_index,
                text,
                score: item.score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{Chunk, EmbeddingRecord};
    use crate::stores::InMemoryStore;
    use crate::StoreError;

    async fn seeded_store(embedder: &CharacterNgramEmbedder) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::with_index("docs", embedder.dimensions));
        let adapter = VectorStoreAdapter::new(Arc::clone(&store), embedder.dimensions);

        let resume = [
            "Senior Rust engineer building distributed storage",
            "Hobbies include sailing and woodworking",
        ];
        let posting = ["Hiring a Rust engineer for distributed storage systems"];

        for (namespace, texts) in [("jane-resume", &resume[..]), ("posting-42", &posting[..])] {
            let records: Vec<EmbeddingRecord> = texts
                .iter()
                .enumerate()
                .map(|(index, text)| EmbeddingRecord {
                    chunk: Chunk::new(index, *text),
                    vector: embedder.embed_sync(text),
                })
                .collect();
            adapter.upsert(namespace, &records).await.unwrap();
        }

        store
    }

    #[tokio::test]
    async fn retrieve_orders_chunks_by_similarity() {
        let embedder = CharacterNgramEmbedder::default();
        let store = seeded_store(&embedder).await;
        let retrieval = RetrievalOrchestrator::new(Arc::new(embedder), store, "test-model");

        let context = retrieval
            .retrieve("Rust engineer distributed storage", "jane-resume", 2)
            .await
            .unwrap();

        assert_eq!(context.chunks.len(), 2);
        assert_eq!(context.chunks[0].id, "chunk-0");
        assert_eq!(context.chunks[0].chunk_index, Some(0));
        assert!(context.chunks[0].score > context.chunks[1].score);
        assert!(context.chunks.iter().all(|chunk| chunk.namespace == "jane-resume"));
    }

    #[tokio::test]
    async fn retrieve_across_merges_namespaces() {
        let embedder = CharacterNgramEmbedder::default();
        let store = seeded_store(&embedder).await;
        let retrieval = RetrievalOrchestrator::new(Arc::new(embedder), store, "test-model");

        let context = retrieval
            .retrieve_across(
                "Rust engineer distributed storage",
                &["jane-resume".to_string(), "posting-42".to_string()],
                2,
            )
            .await
            .unwrap();

        assert_eq!(context.chunks.len(), 2);
        assert!(context.chunks[0].score >= context.chunks[1].score);
        assert!(context.chunks.iter().all(|chunk| chunk.text.contains("Rust")));
    }

    #[tokio::test]
    async fn store_read_failure_propagates() {
        let embedder = CharacterNgramEmbedder::default();
        let store = seeded_store(&embedder).await;
        let retrieval = RetrievalOrchestrator::new(Arc::new(embedder), store, "test-model");

        let result = retrieval.retrieve("Rust", "unknown-namespace", 3).await;
        assert!(matches!(
            result,
            Err(RetrievalError::Store(StoreError::NamespaceNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let embedder = CharacterNgramEmbedder::default();
        let store = Arc::new(InMemoryStore::with_index("docs", embedder.dimensions));
        let retrieval = RetrievalOrchestrator::new(Arc::new(embedder), store, "test-model");

        let result = retrieval.retrieve("   ", "jane-resume", 3).await;
        assert!(matches!(result, Err(RetrievalError::EmptyQuery)));
    }

    #[tokio::test]
    async fn zero_top_k_is_rejected() {
        let embedder = CharacterNgramEmbedder::default();
        let store = seeded_store(&embedder).await;
        let retrieval = RetrievalOrchestrator::new(Arc::new(embedder), store, "test-model");

        let single = retrieval.retrieve("Rust", "jane-resume", 0).await;
        assert!(matches!(single, Err(RetrievalError::ZeroTopK)));

        let merged = retrieval
            .retrieve_across("Rust", &["jane-resume".to_string()], 0)
            .await;
        assert!(matches!(merged, Err(RetrievalError::ZeroTopK)));
    }
}

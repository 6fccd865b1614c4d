use crate::error::EmbeddingError;
use crate::models::{Chunk, EmbeddingRecord};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 3_072;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Offline embedder hashing character trigrams into a fixed number of buckets.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Clone)]
pub struct SkippedChunk {
    pub chunk_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingBatch {
    pub records: Vec<EmbeddingRecord>,
    pub skipped: Vec<SkippedChunk>,
}

/// Embeds chunks one call at a time, in input order.
pub struct EmbeddingGenerator<E> {
    embedder: Arc<E>,
}

impl<E> Clone for EmbeddingGenerator<E> {
    fn clone(&self) -> Self {
        Self {
            embedder: Arc::clone(&self.embedder),
        }
    }
}

impl<E> EmbeddingGenerator<E>
where
    E: Embedder,
{
    pub fn new(embedder: Arc<E>) -> Self {
        Self { embedder }
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub async fn embed_one(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        self.embedder.embed(text, model).await
    }

    /// A failing chunk is logged and skipped; the rest still get embedded.
    /// Rejected credentials stop the loop, since every later call would fail the same way.
    pub async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        model: &str,
    ) -> Result<EmbeddingBatch, EmbeddingError> {
        let mut batch = EmbeddingBatch::default();

        for chunk in chunks {
            if chunk.text.trim().is_empty() {
                debug!(chunk_index = chunk.index, "skipping blank chunk");
                continue;
            }

            match self.embedder.embed(&chunk.text, model).await {
                Ok(vector) => batch.records.push(EmbeddingRecord {
                    chunk: chunk.clone(),
                    vector,
                }),
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(chunk_index = chunk.index, %error, "embedding failed, chunk skipped");
                    batch.skipped.push(SkippedChunk {
                        chunk_index: chunk.index,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(batch)
    }
}

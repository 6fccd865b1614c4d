use crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS;
use crate::error::ConfigError;
use crate::lifecycle::{
    DEFAULT_DELETION_GRACE, DEFAULT_READY_POLL_ATTEMPTS, DEFAULT_READY_POLL_INTERVAL,
};
use crate::models::{IngestionOptions, DEFAULT_EMBEDDING_MODEL};
use std::time::Duration;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_INDEX_NAME: &str = "career-documents";

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub api_key: String,
    pub index_name: String,
    pub control_plane_url: String,
    pub api_version: String,
    pub cloud: String,
    pub region: String,
    pub deletion_grace: Duration,
    pub ready_poll_interval: Duration,
    pub ready_poll_attempts: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            control_plane_url: "https://api.pinecone.io".to_string(),
            api_version: "2024-07".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            deletion_grace: DEFAULT_DELETION_GRACE,
            ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
            ready_poll_attempts: DEFAULT_READY_POLL_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub ingestion: IngestionOptions,
    pub top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default(), StoreConfig::default())
    }
}

impl PipelineConfig {
    pub fn new(embedding: EmbeddingConfig, store: StoreConfig) -> Self {
        let ingestion = IngestionOptions {
            embedding_model: embedding.model.clone(),
            ..IngestionOptions::default()
        };

        Self {
            embedding,
            store,
            ingestion,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Fails fast on anything that would make every later call fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("embedding API key"));
        }
        if self.store.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("vector store API key"));
        }
        self.validate_settings()
    }

    /// Everything except credentials; enough for offline runs.
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        if self.store.index_name.trim().is_empty() {
            return Err(ConfigError::Missing("vector index name"));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Missing("embedding model"));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding.dimensions",
                details: "must be greater than zero".to_string(),
            });
        }
        if self.ingestion.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "ingestion.chunk_size",
                details: "must be greater than zero".to_string(),
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "top_k",
                details: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

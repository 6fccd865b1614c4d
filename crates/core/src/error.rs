use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid configuration for {field}: {details}")]
    Invalid { field: &'static str, details: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf extraction failed: {0}")]
    Extraction(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no embeddings produced for {filename} ({chunk_count} chunks)")]
    NoEmbeddings { filename: String, chunk_count: usize },

    #[error("no vectors stored for {filename}: all {failed_batches} upsert batches failed")]
    NothingStored {
        filename: String,
        failed_batches: usize,
    },

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// True when the failure is about the pipeline rather than one document.
    pub fn is_fatal(&self) -> bool {
        match self {
            IngestError::Embedding(error) => error.is_fatal(),
            IngestError::Store(error) => error.is_fatal(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding client not configured: {0}")]
    NotConfigured(String),

    #[error("embedding input is empty")]
    EmptyInput,

    #[error("embedding rate limit hit: {0}")]
    RateLimited(String),

    #[error("embedding quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("embedding request unauthorized: {0}")]
    Unauthorized(String),

    #[error("embedding backend returned {status}: {details}")]
    Backend { status: u16, details: String },

    #[error("malformed embedding response: {0}")]
    MalformedResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Credential problems fail every later call too; quota and rate limits stay per chunk.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EmbeddingError::NotConfigured(_) | EmbeddingError::Unauthorized(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store not configured: {0}")]
    NotConfigured(String),

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index already exists: {0}")]
    AlreadyExists(String),

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("store not available yet: {0}")]
    NotReady(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors that make every further write pointless, as opposed to one bad batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::NotConfigured(_) | StoreError::DimensionMismatch { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("top_k must be greater than zero")]
    ZeroTopK,

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store read failed: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::{EmbeddingError, IngestError, StoreError};

    #[test]
    fn rejected_credentials_are_fatal_but_throttling_is_not() {
        assert!(EmbeddingError::Unauthorized("401".to_string()).is_fatal());
        assert!(EmbeddingError::NotConfigured("no key".to_string()).is_fatal());
        assert!(!EmbeddingError::RateLimited("429".to_string()).is_fatal());
        assert!(!EmbeddingError::QuotaExceeded("429".to_string()).is_fatal());

        assert!(IngestError::from(EmbeddingError::Unauthorized("401".to_string())).is_fatal());
        assert!(!IngestError::Extraction("bad header".to_string()).is_fatal());
    }

    #[test]
    fn only_configuration_and_dimension_errors_are_fatal() {
        assert!(StoreError::NotConfigured("no key".to_string()).is_fatal());
        assert!(StoreError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
        .is_fatal());
        assert!(!StoreError::NamespaceNotFound("resume".to_string()).is_fatal());
        assert!(!StoreError::BackendResponse {
            backend: "pinecone".to_string(),
            details: "500".to_string()
        }
        .is_fatal());
    }
}

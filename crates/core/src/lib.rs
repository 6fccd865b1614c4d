pub mod chunking;
pub mod config;
pub mod embedders;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod retrieval;
pub mod store;
pub mod stores;
pub mod sync;
pub mod traits;

pub use chunking::{chunk_text, normalize_whitespace, ChunkingConfig};
pub use config::{EmbeddingConfig, PipelineConfig, StoreConfig, DEFAULT_TOP_K};
pub use embedders::OpenAiEmbedder;
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbeddingBatch, EmbeddingGenerator, SkippedChunk,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ConfigError, EmbeddingError, IngestError, RetrievalError, StoreError};
pub use extractor::{
    extract_text, extract_text_from_bytes, join_pages, LopdfExtractor, PageText, PdfExtractor,
};
pub use ingest::{discover_pdf_files, IngestionOrchestrator};
pub use lifecycle::{IndexLifecycleManager, IndexState};
pub use models::{
    BatchFailure, BatchReport, BatchStatus, Chunk, ChunkMetadata, Document, DocumentFailure,
    DocumentReport, DocumentStatus, EmbeddingRecord, IndexDescriptor, IndexStats,
    IngestionOptions, PendingIngestion, QueryMatch, RetrievedChunk, RetrievedContext,
    SimilarityMetric, SyncReport, UpsertReport, VectorStoreEntry,
};
pub use retrieval::RetrievalOrchestrator;
pub use store::{VectorStoreAdapter, UPSERT_BATCH_SIZE};
pub use stores::{InMemoryStore, PineconeStore};
pub use sync::{NamespaceSyncChecker, ProbeQueryChecker};
pub use traits::{IndexAdmin, VectorIndex};

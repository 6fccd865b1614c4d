use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::{Embedder, EmbeddingGenerator};
use crate::extractor::{join_pages, LopdfExtractor, PdfExtractor};
use crate::lifecycle::IndexLifecycleManager;
use crate::models::{
    document_id_for, BatchReport, Document, DocumentFailure, DocumentReport, DocumentStatus,
    IndexDescriptor, IngestionOptions, PendingIngestion, SyncReport,
};
use crate::store::VectorStoreAdapter;
use crate::sync::{NamespaceSyncChecker, ProbeQueryChecker};
use crate::traits::{IndexAdmin, VectorIndex};
use crate::IngestError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// extract -> chunk -> embed -> upsert, one namespace per document.
pub struct IngestionOrchestrator<E, S> {
    extractor: Arc<dyn PdfExtractor>,
    embeddings: EmbeddingGenerator<E>,
    store: VectorStoreAdapter<S>,
    lifecycle: IndexLifecycleManager<S>,
    sync: Arc<dyn NamespaceSyncChecker>,
    index_name: String,
    options: IngestionOptions,
}

impl<E, S> IngestionOrchestrator<E, S>
where
    E: Embedder + 'static,
    S: VectorIndex + IndexAdmin + 'static,
{
    pub fn new(
        embedder: Arc<E>,
        store: Arc<S>,
        index_name: impl Into<String>,
        options: IngestionOptions,
    ) -> Self {
        let dimension = embedder.dimensions();
        Self {
            extractor: Arc::new(LopdfExtractor),
            embeddings: EmbeddingGenerator::new(embedder),
            store: VectorStoreAdapter::new(Arc::clone(&store), dimension),
            lifecycle: IndexLifecycleManager::new(Arc::clone(&store)),
            sync: Arc::new(ProbeQueryChecker::new(store, dimension)),
            index_name: index_name.into(),
            options,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_sync_checker(mut self, sync: Arc<dyn NamespaceSyncChecker>) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_deletion_grace(mut self, grace: Duration) -> Self {
        self.lifecycle = self.lifecycle.with_grace_period(grace);
        self
    }

    pub fn with_readiness_polling(mut self, interval: Duration, attempts: usize) -> Self {
        self.lifecycle = self.lifecycle.with_readiness_polling(interval, attempts);
        self
    }

    pub fn lifecycle(&self) -> &IndexLifecycleManager<S> {
        &self.lifecycle
    }

    async fn ensure_index(&self) -> Result<IndexDescriptor, IngestError> {
        Ok(self
            .lifecycle
            .resolve(&self.index_name, self.store.dimension())
            .await?)
    }

    pub async fn ingest_one(&self, path: &Path) -> Result<DocumentReport, IngestError> {
        let document = Document::from_path(path)?;
        self.ensure_index().await?;

        info!(
            namespace = %document.document_id,
            size_bytes = document.size_bytes,
            checksum = %document.checksum,
            "ingesting document"
        );
        let text = self.extractor.extract_text(path)?;
        self.index_text(&document.filename, &document.document_id, &text)
            .await
    }

    /// For uploads that only exist as an in-memory buffer.
    pub async fn ingest_bytes(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<DocumentReport, IngestError> {
        let namespace = document_id_for(Path::new(filename))?;
        self.ensure_index().await?;

        let pages = self.extractor.extract_pages_from_bytes(bytes, filename)?;
        self.index_text(filename, &namespace, &join_pages(&pages))
            .await
    }

    async fn index_text(
        &self,
        filename: &str,
        namespace: &str,
        text: &str,
    ) -> Result<DocumentReport, IngestError> {
        let chunks = chunk_text(text, ChunkingConfig::from(&self.options))?;
        if chunks.is_empty() {
            return Err(IngestError::Extraction(format!(
                "{filename} produced no text to chunk"
            )));
        }

        let embedded = self
            .embeddings
            .embed_chunks(&chunks, &self.options.embedding_model)
            .await?;
        if embedded.records.is_empty() {
            return Err(IngestError::NoEmbeddings {
                filename: filename.to_string(),
                chunk_count: chunks.len(),
            });
        }

        let upsert = self.store.upsert(namespace, &embedded.records).await?;
        if upsert.stored_count == 0 && !upsert.errors.is_empty() {
            return Err(IngestError::NothingStored {
                filename: filename.to_string(),
                failed_batches: upsert.errors.len(),
            });
        }

        let status = if upsert.errors.is_empty() {
            DocumentStatus::Success
        } else {
            DocumentStatus::PartiallyStored
        };

        info!(
            namespace,
            chunks = chunks.len(),
            embeddings = embedded.records.len(),
            stored = upsert.stored_count,
            skipped_chunks = embedded.skipped.len(),
            "document indexed"
        );

        Ok(DocumentReport {
            filename: filename.to_string(),
            namespace: namespace.to_string(),
            chunk_count: chunks.len(),
            embedding_count: embedded.records.len(),
            stored_count: upsert.stored_count,
            status,
            batch_errors: upsert.errors,
        })
    }

    /// Best effort: a failing document is itemized and the rest continue.
    /// Only pipeline-wide failures (credentials, dimension mismatch) abort.
    pub async fn ingest_batch(&self, paths: &[PathBuf]) -> Result<BatchReport, IngestError> {
        if paths.is_empty() {
            return Err(IngestError::InvalidArgument(
                "no documents to ingest".to_string(),
            ));
        }

        let mut documents = Vec::new();
        let mut errors = Vec::new();

        for path in paths {
            match self.ingest_one(path).await {
                Ok(report) => documents.push(report),
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(path = %path.display(), %error, "document ingestion failed");
                    errors.push(DocumentFailure {
                        filename: display_name(path),
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(BatchReport::from_parts(documents, errors))
    }

    pub async fn ingest_folder(&self, folder: &Path) -> Result<BatchReport, IngestError> {
        let files = discover_pdf_files(folder);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }
        self.ingest_batch(&files).await
    }

    /// Ingests only the documents whose namespace holds no vectors yet.
    pub async fn ingest_pending(
        &self,
        paths: &[PathBuf],
    ) -> Result<PendingIngestion, IngestError> {
        let candidates: Vec<String> = paths
            .iter()
            .filter_map(|path| document_id_for(path).ok())
            .collect();
        let sync = self.sync.check_sync(&candidates).await;

        let pending: Vec<PathBuf> = paths
            .iter()
            .filter(|path| {
                document_id_for(path)
                    .map(|id| !sync.indexed.contains(&id))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        let report = if pending.is_empty() {
            BatchReport::empty()
        } else {
            self.ingest_batch(&pending).await?
        };

        Ok(PendingIngestion {
            already_indexed: sync.indexed,
            report,
        })
    }

    /// Drops and recreates the whole index, then ingests every document.
    pub async fn train_from_scratch(
        &self,
        paths: &[PathBuf],
    ) -> Result<BatchReport, IngestError> {
        if paths.is_empty() {
            return Err(IngestError::InvalidArgument(
                "no documents to train on".to_string(),
            ));
        }

        self.lifecycle
            .recreate_for_full_retrain(&self.index_name, self.store.dimension())
            .await?;
        self.ingest_batch(paths).await
    }

    pub async fn check_sync(&self, candidates: &[String]) -> SyncReport {
        self.sync.check_sync(candidates).await
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

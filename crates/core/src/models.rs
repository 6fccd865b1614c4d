use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// An uploaded file. The identifier doubles as its vector-store namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub filename: String,
    pub source_path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
            .to_string();
        let document_id = document_id_for(path)?;

        let metadata = fs::metadata(path)?;
        let uploaded_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            document_id,
            filename,
            source_path: path.to_path_buf(),
            size_bytes: metadata.len(),
            checksum: digest_file(path)?,
            uploaded_at,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.document_id
    }
}

/// Filename without its extension.
pub fn document_id_for(path: &Path) -> Result<String, IngestError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub char_len: usize,
}

impl Chunk {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let char_len = text.chars().count();
        Self {
            index,
            text,
            char_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub text: String,
    pub chunk_index: usize,
}

/// The persisted unit. Re-writing the same id overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreEntry {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl VectorStoreEntry {
    pub fn chunk_id(global_index: usize) -> String {
        format!("chunk-{global_index}")
    }

    pub fn from_record(global_index: usize, record: &EmbeddingRecord) -> Self {
        Self {
            id: Self::chunk_id(global_index),
            values: record.vector.clone(),
            metadata: ChunkMetadata {
                text: record.chunk.text.clone(),
                chunk_index: record.chunk.index,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
    Dotproduct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub dimension: usize,
    pub metric: SimilarityMetric,
    /// False while the store is still provisioning the index.
    #[serde(default)]
    pub ready: bool,
}

impl IndexDescriptor {
    pub fn cosine(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric: SimilarityMetric::Cosine,
            ready: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub dimension: usize,
    pub total_vector_count: u64,
    pub namespaces: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub batch: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertReport {
    pub stored_count: usize,
    pub total_count: usize,
    pub errors: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Success,
    PartiallyStored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub filename: String,
    pub namespace: String,
    pub chunk_count: usize,
    pub embedding_count: usize,
    pub stored_count: usize,
    pub status: DocumentStatus,
    pub batch_errors: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    pub errors: Vec<DocumentFailure>,
    pub status: BatchStatus,
}

impl BatchReport {
    pub fn from_parts(documents: Vec<DocumentReport>, errors: Vec<DocumentFailure>) -> Self {
        let status = if errors.is_empty() {
            BatchStatus::Success
        } else if documents.is_empty() {
            BatchStatus::Failed
        } else {
            BatchStatus::PartialSuccess
        };

        Self {
            documents,
            errors,
            status,
        }
    }

    pub fn empty() -> Self {
        Self::from_parts(Vec::new(), Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingIngestion {
    pub already_indexed: Vec<String>,
    pub report: BatchReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub indexed: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub namespace: String,
    pub id: String,
    pub chunk_index: Option<usize>,
    pub text: String,
    pub score: f32,
}

/// Ordered matches handed to the external answer generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub query: String,
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievedContext {
    pub fn grounding_text(&self, max_chars: usize) -> String {
        let mut context = String::new();
        let mut used = 0usize;

        for chunk in &self.chunks {
            let text = chunk.text.trim();
            if text.is_empty() {
                continue;
            }

            let separator = if context.is_empty() { 0 } else { 2 };
            let length = text.chars().count();
            if used + separator + length > max_chars {
                break;
            }

            if separator > 0 {
                context.push_str("\n\n");
            }
            context.push_str(text);
            used += separator + length;
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn document_id_drops_extension() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("jane-doe-resume.pdf");
        fs::write(&path, b"%PDF-1.4\n%fake")?;

        let document = Document::from_path(&path)?;
        assert_eq!(document.document_id, "jane-doe-resume");
        assert_eq!(document.namespace(), "jane-doe-resume");
        assert_eq!(document.filename, "jane-doe-resume.pdf");
        assert_eq!(document.size_bytes, 14);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn missing_file_name_is_rejected() {
        let result = document_id_for(Path::new("/"));
        assert!(matches!(result, Err(IngestError::MissingFileName(_))));
    }

    #[test]
    fn batch_status_only_fails_when_every_document_failed() {
        let failure = DocumentFailure {
            filename: "broken.pdf".to_string(),
            reason: "pdf extraction failed".to_string(),
        };
        let report = DocumentReport {
            filename: "ok.pdf".to_string(),
            namespace: "ok".to_string(),
            chunk_count: 1,
            embedding_count: 1,
            stored_count: 1,
            status: DocumentStatus::Success,
            batch_errors: Vec::new(),
        };

        assert_eq!(
            BatchReport::from_parts(vec![report.clone()], Vec::new()).status,
            BatchStatus::Success
        );
        assert_eq!(
            BatchReport::from_parts(vec![report], vec![failure.clone()]).status,
            BatchStatus::PartialSuccess
        );
        assert_eq!(
            BatchReport::from_parts(Vec::new(), vec![failure]).status,
            BatchStatus::Failed
        );
    }

    #[test]
    fn grounding_text_keeps_score_order_within_budget() {
        let context = RetrievedContext {
            query: "rust experience".to_string(),
            chunks: vec![
                RetrievedChunk {
                    namespace: "resume".to_string(),
                    id: "chunk-0".to_string(),
                    chunk_index: Some(0),
                    text: "Five years of Rust".to_string(),
                    score: 0.9,
                },
                RetrievedChunk {
                    namespace: "resume".to_string(),
                    id: "chunk-3".to_string(),
                    chunk_index: Some(3),
                    text: "Led a platform team".to_string(),
                    score: 0.5,
                },
            ],
        };

        assert_eq!(
            context.grounding_text(1_000),
            "Five years of Rust\n\nLed a platform team"
        );
        assert_eq!(context.grounding_text(20), "Five years of Rust");
    }
}

use crate::error::IngestError;
use crate::models::{Chunk, IngestionOptions};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap_size: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap_size: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    /// Distance between consecutive window starts, never below one character.
    pub fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap_size).max(1)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sliding window over the normalized text, measured in characters.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<Chunk>, IngestError> {
    if config.chunk_size == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "chunk size must be greater than zero".to_string(),
        ));
    }

    let normalized = normalize_whitespace(text);
    let chars: Vec<char> = normalized.chars().collect();
    let step = config.step();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = start.saturating_add(config.chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();

        if !trimmed.is_empty() {
            chunks.push(Chunk::new(chunks.len(), trimmed));
        }

        start = start.saturating_add(step);
    }

    Ok(chunks)
}

//! Text chunk types

use serde::{Deserialize, Serialize};

/// One synthesizable slice of the source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChunk {
    /// Position in the chunk sequence
    pub index: usize,
    /// The text to synthesize
    pub text: String,
    /// Length in characters (not bytes)
    pub char_length: usize,
}

impl TextChunk {
    /// Create a chunk, computing its character length
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let char_length = text.chars().count();
        Self { index, text, char_length }
    }
}

/// The chunking result for one content record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub content_id: String,
    /// Sanitized text the chunks were cut from
    pub source_text: String,
    pub chunks: Vec<TextChunk>,
}

impl ChunkPlan {
    pub fn new(content_id: impl Into<String>, source_text: String, chunks: Vec<TextChunk>) -> Self {
        Self {
            content_id: content_id.into(),
            source_text,
            chunks,
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Single-chunk plans skip the manifest indirection
    pub fn is_single(&self) -> bool {
        self.chunks.len() == 1
    }

    pub fn total_text_length(&self) -> usize {
        self.source_text.chars().count()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.iter().map(|c| c.char_length).collect()
    }

    pub fn chunk(&self, index: usize) -> Option<&TextChunk> {
        self.chunks.get(index)
    }

    /// Chunk texts rejoined with single spaces
    pub fn rejoined(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

//! Chunk manifest and persisted audio reference

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest discriminator, serialized as the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestKind {
    ChunkedAudio,
}

/// Descriptive metadata carried alongside the chunk URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMetadata {
    pub content_id: String,
    /// Character length of the sanitized source text
    pub total_length: usize,
    /// Character length of each chunk, in order
    pub chunk_sizes: Vec<usize>,
}

/// Lazy per-chunk audio plan returned for multi-chunk texts
///
/// The URLs are a plan, not a cache: each chunk is synthesized when its URL
/// is first fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkManifest {
    #[serde(rename = "type")]
    pub kind: ManifestKind,
    pub total_chunks: usize,
    pub chunk_urls: Vec<String>,
    pub metadata: ManifestMetadata,
    pub created_at: DateTime<Utc>,
    /// Persisted reference this manifest was served under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_reference: Option<String>,
}

impl ChunkManifest {
    pub fn content_id(&self) -> &str {
        &self.metadata.content_id
    }

    pub fn chunk_sizes(&self) -> &[usize] {
        &self.metadata.chunk_sizes
    }

    pub fn total_text_length(&self) -> usize {
        self.metadata.total_length
    }

    pub fn chunk_url(&self, index: usize) -> Option<&str> {
        self.chunk_urls.get(index).map(String::as_str)
    }

    /// Counts agree across the URL list, the size list and `total_chunks`
    pub fn is_consistent(&self) -> bool {
        self.chunk_urls.len() == self.total_chunks
            && self.metadata.chunk_sizes.len() == self.total_chunks
    }
}

/// Which shape a persisted audio reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Playable audio for a single-chunk text
    Direct,
    /// Manifest URL for a multi-chunk text
    Manifest,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Manifest => "manifest",
        }
    }
}

/// The one audio field persisted per content record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioReference {
    pub kind: ReferenceKind,
    pub url: String,
    pub total_chunks: usize,
    pub created_at: DateTime<Utc>,
}

impl AudioReference {
    pub fn direct(url: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            kind: ReferenceKind::Direct,
            url: url.into(),
            total_chunks: 1,
            created_at,
        }
    }

    pub fn manifest(url: impl Into<String>, total_chunks: usize, created_at: DateTime<Utc>) -> Self {
        Self {
            kind: ReferenceKind::Manifest,
            url: url.into(),
            total_chunks,
            created_at,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.kind == ReferenceKind::Manifest
    }
}

//! Core types for the narrator
//!
//! This crate provides foundational types used across all other crates:
//! - Text chunks and chunk plans
//! - Chunk manifests and persisted audio references
//! - Synthesized audio payloads
//! - Content records
//! - Error types

pub mod audio;
pub mod chunk;
pub mod content;
pub mod error;
pub mod manifest;

pub use audio::{SynthesizedAudio, DEFAULT_AUDIO_CONTENT_TYPE};
pub use chunk::{ChunkPlan, TextChunk};
pub use content::{ContentRecord, ContentType};
pub use error::Error;
pub use manifest::{AudioReference, ChunkManifest, ManifestKind, ManifestMetadata, ReferenceKind};

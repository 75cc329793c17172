//! Chunked narration playback
//!
//! Turns a chunk manifest into one continuous, seekable player:
//! - [`Timeline`] maps global positions onto chunks
//! - [`PlaybackEngine`] is the state machine, free of any media API
//! - [`ChunkedPlayer`] drives the engine against a fetcher and a media backend

pub mod engine;
pub mod error;
pub mod fetcher;
pub mod player;
pub mod timeline;

pub use engine::{
    MediaCommand, MediaEvent, PlaybackEngine, PlaybackSnapshot, PlaybackState, ResourceHandle,
};
pub use error::{MediaFailure, PlayerError};
pub use fetcher::{ChunkFetcher, FetchedChunk, HttpChunkFetcher, PlaybackSource};
pub use player::{ChunkedPlayer, MediaBackend, MediaEventSender, PlayerEvent};
pub use timeline::Timeline;

//! Chunked text-to-speech
//!
//! Features:
//! - Sentence-level chunking under the provider's request cap
//! - Process-wide outbound rate limiting
//! - Bounded retry with silence fallback
//! - Pluggable upstream providers

mod chunker;
mod provider;
mod rate_limit;
mod silence;
mod synthesis;

pub use chunker::{normalize, sanitize, truncate, TextChunker, DEFAULT_SENTENCE};
pub use provider::{create_provider, GoogleTranslateProvider, StubProvider};
pub use rate_limit::{AcquireOutcome, RateLimitError, RateLimitSnapshot, RateLimiter};
pub use silence::{silence_wav, wav_duration, WAV_CONTENT_TYPE};
pub use synthesis::SynthesisClient;

use narrator_core::SynthesizedAudio;

use crate::PipelineError;

/// Upstream speech provider
#[async_trait::async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize one chunk of text (already under the request cap)
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError>;

    /// Provider name, for logs and metrics
    fn name(&self) -> &'static str;
}

//! Text-to-speech pipeline for long-form narration
//!
//! This crate provides the server-side synthesis path:
//! - Readable text extraction from stored summaries
//! - Sentence-level chunking under the provider's request cap
//! - Process-wide outbound rate limiting
//! - Retrying synthesis with silence fallback

pub mod summary;
pub mod tts;

pub use summary::readable_text;

// TTS exports
pub use tts::{
    create_provider, sanitize, silence_wav, wav_duration, AcquireOutcome, GoogleTranslateProvider,
    RateLimitError, RateLimitSnapshot, RateLimiter, SpeechProvider, StubProvider, SynthesisClient,
    TextChunker, DEFAULT_SENTENCE, WAV_CONTENT_TYPE,
};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider returned HTTP {status}: {message}")]
    ProviderStatus { status: u16, message: String },

    #[error("Upstream synthesis failed after {attempts} attempts: {message}")]
    UpstreamSynthesis { attempts: u32, message: String },

    #[error("Timeout")]
    Timeout,

    #[error("Audio error: {0}")]
    Audio(String),
}

impl From<PipelineError> for narrator_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UpstreamSynthesis { attempts, message } => {
                narrator_core::Error::UpstreamSynthesis { attempts, message }
            }
            other => narrator_core::Error::Other(other.to_string()),
        }
    }
}

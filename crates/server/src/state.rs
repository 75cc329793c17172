//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use narrator_config::Settings;
use narrator_persistence::ContentStore;
use narrator_pipeline::{create_provider, RateLimiter, SpeechProvider, SynthesisClient, TextChunker};

use crate::manifest::ManifestService;
use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Settings>,
    /// Chunk planning and synthesis
    pub manifests: Arc<ManifestService>,
    /// The one outbound rate limiter for this process
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Build state around an explicit provider and limiter
    pub fn new(
        config: Settings,
        store: Arc<dyn ContentStore>,
        provider: Arc<dyn SpeechProvider>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let synthesis = SynthesisClient::new(
            provider,
            limiter.clone(),
            config.synthesis.retry.clone(),
            config.synthesis.fallback.clone(),
        );
        let chunker = TextChunker::new(config.synthesis.chunking.max_chunk_length)
            .with_total_limit(config.synthesis.chunking.max_total_length);

        Self {
            manifests: Arc::new(ManifestService::new(store, synthesis, chunker)),
            limiter,
            config: Arc::new(config),
        }
    }

    /// Build state with the provider and limiter described by `config`
    pub fn from_settings(config: Settings, store: Arc<dyn ContentStore>) -> Result<Self, ServerError> {
        let provider = create_provider(
            &config.synthesis.provider,
            config.synthesis.fallback.sample_rate,
        )?;
        let limiter = Arc::new(RateLimiter::new(config.synthesis.rate_limit.clone()));
        Ok(Self::new(config, store, provider, limiter))
    }
}

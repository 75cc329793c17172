//! Upstream speech providers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use narrator_config::{ProviderConfig, ProviderKind};
use narrator_core::{SynthesizedAudio, DEFAULT_AUDIO_CONTENT_TYPE};
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};

use super::silence::{silence_wav, WAV_CONTENT_TYPE};
use super::SpeechProvider;
use crate::PipelineError;

/// Build the provider selected in configuration
pub fn create_provider(
    config: &ProviderConfig,
    sample_rate: u32,
) -> Result<Arc<dyn SpeechProvider>, PipelineError> {
    match config.kind {
        ProviderKind::Google => Ok(Arc::new(GoogleTranslateProvider::new(config.clone())?)),
        ProviderKind::Stub => Ok(Arc::new(StubProvider::new(sample_rate))),
    }
}

/// Google Translate's public TTS endpoint
///
/// Accepts roughly 200 characters per request and answers with MP3.
pub struct GoogleTranslateProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl GoogleTranslateProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PipelineError::Provider(format!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait::async_trait]
impl SpeechProvider for GoogleTranslateProvider {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError> {
        let text_len = text.chars().count().to_string();
        let speed = self.config.speed.to_string();

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("ie", "UTF-8"),
                ("q", text),
                ("tl", self.config.language.as_str()),
                ("total", "1"),
                ("idx", "0"),
                ("textlen", text_len.as_str()),
                ("client", "tw-ob"),
                ("prev", "input"),
                ("ttsspeed", speed.as_str()),
            ])
            .header(USER_AGENT, &self.config.user_agent)
            .header(REFERER, &self.config.referer)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::Timeout
                } else {
                    PipelineError::Provider(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string();
            return Err(PipelineError::ProviderStatus {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_AUDIO_CONTENT_TYPE)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))?;
        if bytes.is_empty() {
            return Err(PipelineError::Provider("empty audio body".to_string()));
        }

        Ok(SynthesizedAudio::new(bytes, content_type))
    }

    fn name(&self) -> &'static str {
        "google_translate"
    }
}

/// Silence per character of input
const STUB_MS_PER_CHAR: u32 = 50;

/// Offline provider that answers with silence proportional to text length
///
/// Texts containing any configured failure marker are rejected, which lets
/// local setups exercise the retry and fallback paths.
#[derive(Debug, Default)]
pub struct StubProvider {
    sample_rate: u32,
    fail_markers: Vec<String>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            fail_markers: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every request whose text contains one of `markers`
    pub fn failing_on<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Number of synthesis calls received so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl SpeechProvider for StubProvider {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if let Some(marker) = self.fail_markers.iter().find(|m| text.contains(m.as_str())) {
            return Err(PipelineError::ProviderStatus {
                status: 503,
                message: format!("stub failure on '{}'", marker),
            });
        }

        let duration_ms = text.chars().count() as u32 * STUB_MS_PER_CHAR;
        let bytes = silence_wav(duration_ms, self.sample_rate)?;
        Ok(SynthesizedAudio::new(bytes, WAV_CONTENT_TYPE))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

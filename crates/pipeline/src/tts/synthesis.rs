//! Rate-limited synthesis with bounded retry

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use narrator_config::{FallbackConfig, RetryConfig};
use narrator_core::SynthesizedAudio;

use super::chunker::normalize;
use super::rate_limit::RateLimiter;
use super::silence::{silence_wav, WAV_CONTENT_TYPE};
use super::SpeechProvider;
use crate::PipelineError;

/// Sends chunks to the upstream provider under the shared rate limit
#[derive(Clone)]
pub struct SynthesisClient {
    provider: Arc<dyn SpeechProvider>,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    fallback: FallbackConfig,
}

impl SynthesisClient {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
        fallback: FallbackConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            retry,
            fallback,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Synthesize one chunk, retrying failed attempts
    ///
    /// Every attempt takes a rate-limit permit first. After attempt `n` fails
    /// the client sleeps `n * retry.delay_ms` before trying again.
    pub async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError> {
        let text = normalize(text);
        if text.is_empty() {
            return Err(PipelineError::Provider("nothing to synthesize".to_string()));
        }

        let attempts = self.retry.attempts.max(1);
        let provider = self.provider.name();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let permit = match self.limiter.try_acquire() {
                Ok(permit) => permit,
                Err(throttled) => {
                    tracing::debug!(
                        provider,
                        attempt,
                        retry_after_ms = throttled.retry_after().as_millis() as u64,
                        "Synthesis throttled: {}",
                        throttled
                    );
                    counter!("narrator_synthesis_throttled_total", "reason" => throttled.reason())
                        .increment(1);
                    self.limiter.acquire().await
                }
            };
            histogram!("narrator_rate_limit_wait_seconds").record(permit.waited.as_secs_f64());
            counter!("narrator_synthesis_attempts_total", "provider" => provider).increment(1);

            let started = Instant::now();
            match self.provider.synthesize(&text).await {
                Ok(audio) => {
                    histogram!("narrator_synthesis_duration_seconds", "provider" => provider)
                        .record(started.elapsed().as_secs_f64());
                    tracing::debug!(
                        provider,
                        attempt,
                        chars = text.chars().count(),
                        bytes = audio.len(),
                        "Chunk synthesized"
                    );
                    return Ok(audio);
                }
                Err(e) => {
                    tracing::warn!(provider, attempt, attempts, error = %e, "Synthesis attempt failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        let backoff = Duration::from_millis(self.retry.delay_ms * attempt as u64);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        counter!("narrator_synthesis_failures_total", "provider" => provider).increment(1);
        Err(PipelineError::UpstreamSynthesis {
            attempts,
            message: last_error,
        })
    }

    /// Synthesize, substituting silence once every retry has failed
    ///
    /// Errors only when the fallback is disabled or the silence buffer itself
    /// cannot be built.
    pub async fn synthesize_or_silence(
        &self,
        text: &str,
    ) -> Result<SynthesizedAudio, PipelineError> {
        match self.synthesize(text).await {
            Ok(audio) => Ok(audio),
            Err(e) if self.fallback.enabled => {
                tracing::warn!(error = %e, "Substituting silence for failed chunk");
                counter!("narrator_synthesis_fallbacks_total").increment(1);
                self.silence()
            }
            Err(e) => Err(e),
        }
    }

    /// The fallback silence buffer
    pub fn silence(&self) -> Result<SynthesizedAudio, PipelineError> {
        let bytes = silence_wav(self.fallback.silence_ms, self.fallback.sample_rate)?;
        Ok(SynthesizedAudio::new(bytes, WAV_CONTENT_TYPE).into_fallback())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::{wav_duration, RateLimitError, StubProvider};
    use narrator_config::RateLimitConfig;

    fn client(provider: Arc<StubProvider>, limiter: RateLimiter) -> SynthesisClient {
        SynthesisClient::new(
            provider,
            Arc::new(limiter),
            RetryConfig::default(),
            FallbackConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let provider = Arc::new(StubProvider::new(8000));
        let client = client(provider.clone(), RateLimiter::disabled());

        let audio = client.synthesize("  Hello \n world.  ").await.unwrap();
        assert!(!audio.fallback);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_linear_backoff() {
        let provider = Arc::new(StubProvider::new(8000).failing_on(["fail"]));
        let client = client(provider.clone(), RateLimiter::disabled());
        let start = tokio::time::Instant::now();

        let err = client.synthesize("this will fail").await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamSynthesis { attempts: 3, .. }));
        assert_eq!(provider.calls(), 3);
        // 1 x 2000 + 2 x 2000
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_takes_a_permit() {
        let provider = Arc::new(StubProvider::new(8000).failing_on(["fail"]));
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_requests_per_window: 50,
            window_ms: 60_000,
            min_request_delay_ms: 1200,
        });
        let client = client(provider, limiter);

        let _ = client.synthesize("fail again").await;
        assert_eq!(client.limiter().snapshot().requests_in_window, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_request_waits_for_permit() {
        let provider = Arc::new(StubProvider::new(8000));
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_requests_per_window: 50,
            window_ms: 60_000,
            min_request_delay_ms: 1200,
        });
        let client = client(provider.clone(), limiter);
        let start = tokio::time::Instant::now();

        client.synthesize("First chunk.").await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(matches!(
            client.limiter().try_acquire(),
            Err(RateLimitError::TooSoon { .. })
        ));

        // Rejected right away, then granted once the delay has passed
        client.synthesize("Second chunk.").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1200));
        assert_eq!(provider.calls(), 2);
        assert_eq!(client.limiter().snapshot().requests_in_window, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_is_marked_silence() {
        let provider = Arc::new(StubProvider::new(8000).failing_on(["fail"]));
        let client = client(provider, RateLimiter::disabled());

        let audio = client.synthesize_or_silence("fail here").await.unwrap();
        assert!(audio.fallback);
        assert_eq!(audio.content_type, WAV_CONTENT_TYPE);
        assert_eq!(wav_duration(&audio.bytes), Some(Duration::from_millis(500)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_fallback_propagates_error() {
        let provider = Arc::new(StubProvider::new(8000).failing_on(["fail"]));
        let client = SynthesisClient::new(
            provider,
            Arc::new(RateLimiter::disabled()),
            RetryConfig { attempts: 1, delay_ms: 10 },
            FallbackConfig { enabled: false, ..FallbackConfig::default() },
        );

        assert!(client.synthesize_or_silence("fail").await.is_err());
    }
}

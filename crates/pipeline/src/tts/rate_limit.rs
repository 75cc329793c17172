//! Fixed-window rate limiter for outbound synthesis requests
//!
//! One instance guards every call to the upstream provider in the process.
//! Callers queue on an async mutex that stays held while they wait, so two
//! requests can never slip through the same gap.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use narrator_config::RateLimitConfig;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Window state, only touched with the lock held
#[derive(Debug)]
struct RateLimitWindow {
    window_start: Instant,
    request_count: u32,
    last_request: Option<Instant>,
}

impl RateLimitWindow {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            request_count: 0,
            last_request: None,
        }
    }

    fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.request_count = 0;
    }
}

/// Result of a granted permit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOutcome {
    /// Total time spent sleeping before the permit was granted
    pub waited: Duration,
    /// Position of this request in the current window (1-based)
    pub request_number: u32,
}

/// Point-in-time view for readiness probes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub enabled: bool,
    pub max_requests_per_window: u32,
    pub requests_in_window: u32,
    pub window_ms: u64,
    pub min_request_delay_ms: u64,
    /// Callers currently queued for a permit
    pub waiting: usize,
}

/// Process-wide rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: Mutex<RateLimitWindow>,
    /// Mirrors of the locked state for lock-free snapshots
    requests_in_window: AtomicU32,
    waiting: AtomicUsize,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: Mutex::new(RateLimitWindow::new(Instant::now())),
            requests_in_window: AtomicU32::new(0),
            waiting: AtomicUsize::new(0),
        }
    }

    /// A limiter that never waits
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::disabled())
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn window_len(&self) -> Duration {
        Duration::from_millis(self.config.window_ms)
    }

    fn min_delay(&self) -> Duration {
        Duration::from_millis(self.config.min_request_delay_ms)
    }

    /// Wait until a request may be sent, then record it
    pub async fn acquire(&self) -> AcquireOutcome {
        if !self.config.enabled {
            return AcquireOutcome {
                waited: Duration::ZERO,
                request_number: 0,
            };
        }

        let queued = QueuedGuard::new(&self.waiting);
        let mut window = self.window.lock().await;
        let mut waited = Duration::ZERO;

        let now = Instant::now();
        if now.duration_since(window.window_start) > self.window_len() {
            window.reset(now);
        }

        if window.request_count >= self.config.max_requests_per_window {
            let reset_at = window.window_start + self.window_len();
            let wait = reset_at.saturating_duration_since(now);
            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                requests = window.request_count,
                "Rate limit window exhausted, waiting for reset"
            );
            tokio::time::sleep(wait).await;
            waited += wait;
            window.reset(Instant::now());
        }

        if let Some(last) = window.last_request {
            let since = Instant::now().duration_since(last);
            if since < self.min_delay() {
                let wait = self.min_delay() - since;
                tokio::time::sleep(wait).await;
                waited += wait;
            }
        }

        window.last_request = Some(Instant::now());
        window.request_count += 1;
        self.requests_in_window
            .store(window.request_count, Ordering::Relaxed);
        drop(queued);

        AcquireOutcome {
            waited,
            request_number: window.request_count,
        }
    }

    /// Take a permit only if one is available right now
    pub fn try_acquire(&self) -> Result<AcquireOutcome, RateLimitError> {
        if !self.config.enabled {
            return Ok(AcquireOutcome {
                waited: Duration::ZERO,
                request_number: 0,
            });
        }

        let mut window = self.window.try_lock().map_err(|_| RateLimitError::TooSoon {
            retry_after: self.min_delay(),
        })?;

        let now = Instant::now();
        if now.duration_since(window.window_start) > self.window_len() {
            window.reset(now);
        }

        if window.request_count >= self.config.max_requests_per_window {
            let reset_at = window.window_start + self.window_len();
            return Err(RateLimitError::WindowExhausted {
                retry_after: reset_at.saturating_duration_since(now),
            });
        }

        if let Some(last) = window.last_request {
            let since = now.duration_since(last);
            if since < self.min_delay() {
                return Err(RateLimitError::TooSoon {
                    retry_after: self.min_delay() - since,
                });
            }
        }

        window.last_request = Some(now);
        window.request_count += 1;
        self.requests_in_window
            .store(window.request_count, Ordering::Relaxed);

        Ok(AcquireOutcome {
            waited: Duration::ZERO,
            request_number: window.request_count,
        })
    }

    /// Current window usage
    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            enabled: self.config.enabled,
            max_requests_per_window: self.config.max_requests_per_window,
            requests_in_window: self.requests_in_window.load(Ordering::Relaxed),
            window_ms: self.config.window_ms,
            min_request_delay_ms: self.config.min_request_delay_ms,
            waiting: self.waiting.load(Ordering::Relaxed),
        }
    }

    /// Lower bound on the time `requests` back-to-back calls take
    pub fn estimated_duration(&self, requests: usize) -> Duration {
        if !self.config.enabled {
            return Duration::ZERO;
        }
        self.min_delay() * requests as u32
    }
}

/// Counts a caller as queued until dropped, including on cancellation
struct QueuedGuard<'a>(&'a AtomicUsize);

impl<'a> QueuedGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for QueuedGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Why a permit was not available right away
///
/// Only produced by [`RateLimiter::try_acquire`]; never leaves the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Every request in the current window is used
    #[error("Rate limit window exhausted, retry in {}ms", .retry_after.as_millis())]
    WindowExhausted { retry_after: Duration },
    /// The previous request was too recent
    #[error("Request too soon, retry in {}ms", .retry_after.as_millis())]
    TooSoon { retry_after: Duration },
}

impl RateLimitError {
    pub fn retry_after(&self) -> Duration {
        match self {
            RateLimitError::WindowExhausted { retry_after }
            | RateLimitError::TooSoon { retry_after } => *retry_after,
        }
    }

    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            RateLimitError::WindowExhausted { .. } => "window_exhausted",
            RateLimitError::TooSoon { .. } => "too_soon",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config(max: u32, window_ms: u64, delay_ms: u64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            max_requests_per_window: max,
            window_ms,
            min_request_delay_ms: delay_ms,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_requests_are_spaced() {
        let limiter = RateLimiter::new(config(50, 60_000, 1200));
        let start = Instant::now();

        for i in 1..=4 {
            let outcome = limiter.acquire().await;
            assert_eq!(outcome.request_number, i);
        }

        assert!(start.elapsed() >= Duration::from_millis(3 * 1200));
        assert!(start.elapsed() < Duration::from_millis(4 * 1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_window_waits_for_reset() {
        let limiter = RateLimiter::new(config(3, 10_000, 1000));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::from_millis(2000));

        let outcome = limiter.acquire().await;
        assert_eq!(outcome.request_number, 1);
        assert!(start.elapsed() >= Duration::from_millis(10_000));
        assert_eq!(outcome.waited, Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(config(50, 60_000, 500)));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().request_number);
        }
        numbers.sort_unstable();

        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(start.elapsed() >= Duration::from_millis(4 * 500));
        assert_eq!(limiter.snapshot().requests_in_window, 5);
        assert_eq!(limiter.snapshot().waiting, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_reports_reason() {
        let limiter = RateLimiter::new(config(2, 10_000, 1000));

        assert!(limiter.try_acquire().is_ok());
        assert!(matches!(
            limiter.try_acquire(),
            Err(RateLimitError::TooSoon { .. })
        ));

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(limiter.try_acquire().is_ok());

        tokio::time::advance(Duration::from_millis(1000)).await;
        let err = limiter.try_acquire().unwrap_err();
        assert!(matches!(err, RateLimitError::WindowExhausted { .. }));
        assert_eq!(err.retry_after(), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_limiter_never_waits() {
        let limiter = RateLimiter::disabled();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(limiter.try_acquire().is_ok());
        assert!(!limiter.snapshot().enabled);
    }

    #[test]
    fn test_estimated_duration() {
        let limiter = RateLimiter::new(config(50, 60_000, 1200));
        assert_eq!(limiter.estimated_duration(3), Duration::from_millis(3600));
        assert_eq!(RateLimiter::disabled().estimated_duration(3), Duration::ZERO);
    }
}

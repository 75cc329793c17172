//! Speech synthesis configuration

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Synthesis configuration: chunking, upstream provider and its limits
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,
}

impl SynthesisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.max_chunk_length == 0 {
            return Err(ConfigError::invalid(
                "synthesis.chunking.max_chunk_length",
                "must be greater than zero",
            ));
        }
        if let Some(total) = self.chunking.max_total_length {
            if total < self.chunking.max_chunk_length {
                return Err(ConfigError::invalid(
                    "synthesis.chunking.max_total_length",
                    "must be at least max_chunk_length",
                ));
            }
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::invalid(
                "synthesis.retry.attempts",
                "at least one attempt is required",
            ));
        }
        if self.rate_limit.enabled {
            if self.rate_limit.max_requests_per_window == 0 {
                return Err(ConfigError::invalid(
                    "synthesis.rate_limit.max_requests_per_window",
                    "must be greater than zero when rate limiting is enabled",
                ));
            }
            if self.rate_limit.window_ms == 0 {
                return Err(ConfigError::invalid(
                    "synthesis.rate_limit.window_ms",
                    "must be greater than zero when rate limiting is enabled",
                ));
            }
        }
        if self.provider.kind == ProviderKind::Google && self.provider.base_url.is_empty() {
            return Err(ConfigError::MissingField("synthesis.provider.base_url".to_string()));
        }
        Ok(())
    }
}

/// Text chunking limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Upstream provider request cap, in characters
    #[serde(default = "default_max_chunk_length")]
    pub max_chunk_length: usize,

    /// Truncate source text beyond this many characters (off when unset)
    #[serde(default)]
    pub max_total_length: Option<usize>,
}

fn default_max_chunk_length() -> usize {
    180
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: default_max_chunk_length(),
            max_total_length: None,
        }
    }
}

/// Which upstream provider to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Google,
    /// Offline silence generator
    Stub,
}

/// Upstream provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Target language code
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_speed")]
    pub speed: f32,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_referer")]
    pub referer: String,
}

fn default_base_url() -> String {
    "https://translate.google.com/translate_tts".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_speed() -> f32 {
    1.0
}
fn default_timeout_ms() -> u64 {
    15_000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_referer() -> String {
    "https://translate.google.com/".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: default_base_url(),
            language: default_language(),
            speed: default_speed(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            referer: default_referer(),
        }
    }
}

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Backoff unit; attempt `n` waits `n * delay_ms` before the next one
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Process-wide outbound rate limit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_requests")]
    pub max_requests_per_window: u32,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Minimum spacing between consecutive requests
    #[serde(default = "default_min_request_delay_ms")]
    pub min_request_delay_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_max_requests() -> u32 {
    50
}
fn default_window_ms() -> u64 {
    60_000
}
fn default_min_request_delay_ms() -> u64 {
    1200
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_window: default_max_requests(),
            window_ms: default_window_ms(),
            min_request_delay_ms: default_min_request_delay_ms(),
        }
    }
}

impl RateLimitConfig {
    /// No limiting at all, for tests and local runs
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Silence substituted for a chunk whose synthesis failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_silence_ms")]
    pub silence_ms: u32,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_silence_ms() -> u32 {
    500
}
fn default_sample_rate() -> u32 {
    16000
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            silence_ms: default_silence_ms(),
            sample_rate: default_sample_rate(),
        }
    }
}

//! Configuration management for the narrator
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Environment variables (NARRATOR__ prefix)

pub mod settings;
pub mod synthesis;

pub use settings::{
    load_settings, ObservabilityConfig, PersistenceBackend, PersistenceConfig, PlaybackConfig,
    ServerConfig, Settings,
};
pub use synthesis::{
    ChunkingConfig, FallbackConfig, ProviderConfig, ProviderKind, RateLimitConfig, RetryConfig,
    SynthesisConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ConfigError, SynthesisConfig};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Chunking, provider, retry and rate-limit configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Content store configuration
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Client playback defaults
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "port 0 is not allowed"));
        }

        self.synthesis.validate()?;
        self.persistence.validate()?;

        if !(self.playback.placeholder_chunk_secs > 0.0) {
            return Err(ConfigError::invalid(
                "playback.placeholder_chunk_secs",
                "must be a positive number of seconds",
            ));
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    // Long enough for a fully rate-limited fast path with retries
    120
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

/// Content store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    /// Process-local store, optionally seeded from a JSON file
    #[default]
    Memory,
    Scylla,
}

/// Content store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceBackend,

    /// ScyllaDB contact points
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,

    /// JSON array of content records loaded into the memory store at startup
    #[serde(default)]
    pub seed_file: Option<String>,
}

fn default_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}
fn default_keyspace() -> String {
    "narrator".to_string()
}
fn default_replication_factor() -> u32 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            hosts: default_hosts(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
            seed_file: None,
        }
    }
}

impl PersistenceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            PersistenceBackend::Scylla => {
                if self.hosts.is_empty() {
                    return Err(ConfigError::MissingField("persistence.hosts".to_string()));
                }
                if self.keyspace.is_empty()
                    || !self
                        .keyspace
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(ConfigError::invalid(
                        "persistence.keyspace",
                        format!("'{}' is not a valid keyspace name", self.keyspace),
                    ));
                }
            }
            PersistenceBackend::Memory => {
                if let Some(seed) = &self.seed_file {
                    // Warn only; the store starts empty without it
                    if !Path::new(seed).is_file() {
                        tracing::warn!("Seed file not found: persistence.seed_file = {}", seed);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Client playback defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Duration estimate for chunks that have not been probed yet
    #[serde(default = "default_placeholder_chunk_secs")]
    pub placeholder_chunk_secs: f64,

    /// Automatic retries of transient chunk failures per session
    #[serde(default = "default_max_auto_retries")]
    pub max_auto_retries: u32,

    /// Fetch chunk i+1 while chunk i plays
    #[serde(default = "default_true")]
    pub prefetch_next: bool,
}

fn default_placeholder_chunk_secs() -> f64 {
    12.0
}
fn default_max_auto_retries() -> u32 {
    3
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            placeholder_chunk_secs: default_placeholder_chunk_secs(),
            max_auto_retries: default_max_auto_retries(),
            prefetch_next: true,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Enable tracing
    #[serde(default = "default_true")]
    pub tracing_enabled: bool,

    /// OTLP endpoint for traces
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Enable metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            tracing_enabled: true,
            otlp_endpoint: None,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (NARRATOR__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(
            File::with_name(&format!("config/{}", env_name)).required(false),
        );
    }

    builder = builder.add_source(
        Environment::with_prefix("NARRATOR")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.persistence.backend, PersistenceBackend::Memory);
        assert_eq!(settings.playback.max_auto_retries, 3);
        assert!(settings.playback.prefetch_next);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        settings.playback.placeholder_chunk_secs = 0.0;
        assert!(settings.validate().is_err());

        settings.playback.placeholder_chunk_secs = 8.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_scylla_keyspace_validation() {
        let mut settings = Settings::default();
        settings.persistence.backend = PersistenceBackend::Scylla;
        settings.persistence.keyspace = "bad-name".to_string();
        assert!(settings.validate().is_err());

        settings.persistence.keyspace = "narrator_test".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"synthesis": {"provider": {"kind": "stub"}}, "server": {"port": 9000}}"#,
        )
        .unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.synthesis.chunking.max_chunk_length, 180);
    }
}

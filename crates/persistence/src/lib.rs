//! Content storage for the narrator
//!
//! Provides read access to content records (summary, title, type) and
//! write access to the single persisted audio reference per record.
//! Backends:
//! - ScyllaDB
//! - In-memory, optionally seeded from a JSON file

pub mod client;
pub mod content;
pub mod error;
pub mod memory;
pub mod schema;

pub use client::{ContentStatements, ScyllaClient};
pub use content::{ContentStore, ScyllaContentStore};
pub use error::PersistenceError;
pub use memory::InMemoryContentStore;

use std::sync::Arc;

use narrator_config::{PersistenceBackend, PersistenceConfig};

/// Initialize the content store selected in configuration
pub async fn init(config: &PersistenceConfig) -> Result<Arc<dyn ContentStore>, PersistenceError> {
    match config.backend {
        PersistenceBackend::Scylla => {
            let client = ScyllaClient::connect(config).await?;
            Ok(Arc::new(ScyllaContentStore::new(client)))
        }
        PersistenceBackend::Memory => match &config.seed_file {
            Some(path) if std::path::Path::new(path).is_file() => {
                Ok(Arc::new(InMemoryContentStore::from_seed_file(path)?))
            }
            _ => Ok(Arc::new(InMemoryContentStore::new())),
        },
    }
}

//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Cannot reach ScyllaDB: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Schema setup failed: {0}")]
    Schema(String),

    #[error("Malformed row for {content_id}: {message}")]
    MalformedRow { content_id: String, message: String },

    #[error("Stored audio reference is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown content: {0}")]
    UnknownContent(String),

    #[error("Cannot load seed file {path}: {message}")]
    Seed { path: String, message: String },
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(e: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::Connection(e.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(e: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::Query(e.to_string())
    }
}

impl From<PersistenceError> for narrator_core::Error {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::UnknownContent(id) => {
                narrator_core::Error::NotFound(format!("Content not found: {}", id))
            }
            other => narrator_core::Error::Persistence(other.to_string()),
        }
    }
}

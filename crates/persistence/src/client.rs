//! ScyllaDB session for the content table
//!
//! Connecting also bootstraps the keyspace and table, then prepares every
//! statement the store runs so request paths never build CQL strings.

use std::sync::Arc;

use narrator_config::PersistenceConfig;
use scylla::prepared_statement::PreparedStatement;
use scylla::{Session, SessionBuilder};

use crate::error::PersistenceError;
use crate::schema;

/// Statements against `<keyspace>.contents`
#[derive(Debug)]
pub struct ContentStatements {
    pub select_record: PreparedStatement,
    pub upsert_record: PreparedStatement,
    pub select_reference: PreparedStatement,
    pub update_reference: PreparedStatement,
}

impl ContentStatements {
    async fn prepare(session: &Session, keyspace: &str) -> Result<Self, PersistenceError> {
        let table = format!("{}.contents", keyspace);
        Ok(Self {
            select_record: session
                .prepare(format!(
                    "SELECT content_id, content_type, summary, title FROM {} WHERE content_id = ?",
                    table
                ))
                .await?,
            upsert_record: session
                .prepare(format!(
                    "UPDATE {} SET content_type = ?, summary = ?, title = ?, updated_at = ? \
                     WHERE content_id = ?",
                    table
                ))
                .await?,
            select_reference: session
                .prepare(format!(
                    "SELECT audio_reference_json FROM {} WHERE content_id = ?",
                    table
                ))
                .await?,
            update_reference: session
                .prepare(format!(
                    "UPDATE {} SET audio_reference_json = ?, updated_at = ? WHERE content_id = ?",
                    table
                ))
                .await?,
        })
    }
}

/// Connected session plus prepared content statements
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    keyspace: String,
    statements: Arc<ContentStatements>,
}

impl ScyllaClient {
    /// Connect, ensure the schema exists and prepare statements
    pub async fn connect(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        if config.hosts.is_empty() {
            return Err(PersistenceError::Connection("no hosts configured".to_string()));
        }
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connecting to ScyllaDB");

        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await?;

        schema::create_keyspace(&session, &config.keyspace, config.replication_factor).await?;
        schema::create_tables(&session, &config.keyspace).await?;
        let statements = ContentStatements::prepare(&session, &config.keyspace).await?;
        tracing::info!(keyspace = %config.keyspace, "Content table ready");

        Ok(Self {
            session: Arc::new(session),
            keyspace: config.keyspace.clone(),
            statements: Arc::new(statements),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn statements(&self) -> &ContentStatements {
        &self.statements
    }
}

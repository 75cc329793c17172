//! Content records and their persisted audio reference

use async_trait::async_trait;
use chrono::Utc;
use narrator_core::{AudioReference, ContentRecord, ContentType};

use crate::{PersistenceError, ScyllaClient};

/// Read access to content and write access to its audio reference
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Load a content record
    async fn get_content(&self, content_id: &str) -> Result<Option<ContentRecord>, PersistenceError>;

    /// Insert or replace a content record, keeping any stored audio reference
    async fn put_content(&self, record: &ContentRecord) -> Result<(), PersistenceError>;

    /// The audio reference stored for a record, if any
    async fn get_audio_reference(
        &self,
        content_id: &str,
    ) -> Result<Option<AudioReference>, PersistenceError>;

    /// Overwrite the audio reference for a record
    async fn save_audio_reference(
        &self,
        content_id: &str,
        reference: &AudioReference,
    ) -> Result<(), PersistenceError>;

    /// Backend name for logs and readiness output
    fn backend(&self) -> &'static str;
}

/// ScyllaDB implementation of the content store
#[derive(Clone)]
pub struct ScyllaContentStore {
    client: ScyllaClient,
}

impl ScyllaContentStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

fn malformed(content_id: &str, err: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::MalformedRow {
        content_id: content_id.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl ContentStore for ScyllaContentStore {
    async fn get_content(&self, content_id: &str) -> Result<Option<ContentRecord>, PersistenceError> {
        let result = self
            .client
            .session()
            .execute_unpaged(&self.client.statements().select_record, (content_id,))
            .await?;

        let Some(row) = result.rows.and_then(|rows| rows.into_iter().next()) else {
            return Ok(None);
        };

        let (content_id, content_type, summary, title): (
            String,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = row.into_typed().map_err(|e| malformed(content_id, e))?;

        Ok(Some(ContentRecord {
            content_id,
            content_type: content_type
                .as_deref()
                .map(ContentType::parse)
                .unwrap_or_default(),
            summary,
            title,
        }))
    }

    async fn put_content(&self, record: &ContentRecord) -> Result<(), PersistenceError> {
        self.client
            .session()
            .execute_unpaged(
                &self.client.statements().upsert_record,
                (
                    record.content_type.as_str(),
                    &record.summary,
                    &record.title,
                    Utc::now().timestamp_millis(),
                    &record.content_id,
                ),
            )
            .await?;

        tracing::debug!(content_id = %record.content_id, "Content stored in ScyllaDB");
        Ok(())
    }

    async fn get_audio_reference(
        &self,
        content_id: &str,
    ) -> Result<Option<AudioReference>, PersistenceError> {
        let result = self
            .client
            .session()
            .execute_unpaged(&self.client.statements().select_reference, (content_id,))
            .await?;

        let Some(row) = result.rows.and_then(|rows| rows.into_iter().next()) else {
            return Ok(None);
        };

        let (json,): (Option<String>,) = row.into_typed().map_err(|e| malformed(content_id, e))?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_audio_reference(
        &self,
        content_id: &str,
        reference: &AudioReference,
    ) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(reference)?;

        self.client
            .session()
            .execute_unpaged(
                &self.client.statements().update_reference,
                (json, Utc::now().timestamp_millis(), content_id),
            )
            .await?;

        tracing::debug!(
            content_id,
            kind = reference.kind.as_str(),
            chunks = reference.total_chunks,
            "Audio reference saved in ScyllaDB"
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "scylla"
    }
}

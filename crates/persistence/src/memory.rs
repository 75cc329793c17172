//! Process-local content store
//!
//! Backs development runs and tests. Records can be seeded from a JSON file
//! holding an array of content records.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use narrator_core::{AudioReference, ContentRecord};
use parking_lot::RwLock;

use crate::content::ContentStore;
use crate::PersistenceError;

#[derive(Debug, Clone)]
struct StoredContent {
    record: ContentRecord,
    audio_reference: Option<AudioReference>,
}

/// In-memory content store
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    contents: RwLock<HashMap<String, StoredContent>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records`
    pub fn with_records(records: impl IntoIterator<Item = ContentRecord>) -> Self {
        let contents = records
            .into_iter()
            .map(|record| {
                (
                    record.content_id.clone(),
                    StoredContent {
                        record,
                        audio_reference: None,
                    },
                )
            })
            .collect();
        Self {
            contents: RwLock::new(contents),
        }
    }

    /// Load records from a JSON array file
    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let seed_error = |message: String| PersistenceError::Seed {
            path: path.display().to_string(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
        let records: Vec<ContentRecord> =
            serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))?;
        tracing::info!(path = %path.display(), records = records.len(), "Seeded content store");
        Ok(Self::with_records(records))
    }

    pub fn len(&self) -> usize {
        self.contents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.read().is_empty()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_content(&self, content_id: &str) -> Result<Option<ContentRecord>, PersistenceError> {
        Ok(self.contents.read().get(content_id).map(|c| c.record.clone()))
    }

    async fn put_content(&self, record: &ContentRecord) -> Result<(), PersistenceError> {
        let mut contents = self.contents.write();
        match contents.get_mut(&record.content_id) {
            Some(existing) => existing.record = record.clone(),
            None => {
                contents.insert(
                    record.content_id.clone(),
                    StoredContent {
                        record: record.clone(),
                        audio_reference: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_audio_reference(
        &self,
        content_id: &str,
    ) -> Result<Option<AudioReference>, PersistenceError> {
        Ok(self
            .contents
            .read()
            .get(content_id)
            .and_then(|c| c.audio_reference.clone()))
    }

    async fn save_audio_reference(
        &self,
        content_id: &str,
        reference: &AudioReference,
    ) -> Result<(), PersistenceError> {
        let mut contents = self.contents.write();
        let entry = contents
            .get_mut(content_id)
            .ok_or_else(|| PersistenceError::UnknownContent(content_id.to_string()))?;
        entry.audio_reference = Some(reference.clone());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

//! Chunk planning, manifest assembly and audio reference persistence
//!
//! A request for a content id is answered one of two ways. Text that fits a
//! single provider request is synthesized immediately and returned as audio.
//! Longer text is answered with a manifest listing one URL per chunk; nothing
//! is synthesized until one of those URLs is fetched.

use std::sync::Arc;

use chrono::Utc;
use narrator_core::{
    AudioReference, ChunkManifest, ChunkPlan, Error, ManifestKind, ManifestMetadata, ReferenceKind,
    SynthesizedAudio,
};
use narrator_persistence::ContentStore;
use narrator_pipeline::{readable_text, SynthesisClient, TextChunker};
use serde::Serialize;

use crate::ServerError;

pub const MANIFEST_PATH: &str = "/audio-manifest";
pub const CHUNK_PATH: &str = "/audio-chunk";
pub const REFERENCE_PATH: &str = "/audio-reference";

const MAX_CONTENT_ID_LEN: usize = 128;

/// Check a raw `contentId` parameter
pub fn validate_content_id(raw: Option<&str>) -> Result<String, ServerError> {
    let id = raw.map(str::trim).unwrap_or_default();
    if id.is_empty() {
        return Err(Error::validation("Please provide contentId").into());
    }
    if id.chars().count() > MAX_CONTENT_ID_LEN
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(Error::validation(format!("Invalid contentId: {}", id)).into());
    }
    Ok(id.to_string())
}

/// URL of one chunk's audio; `_t` busts intermediary caches
pub fn chunk_url(content_id: &str, index: usize, timestamp_ms: i64) -> String {
    format!("{}?contentId={}&chunk={}&_t={}", CHUNK_PATH, content_id, index, timestamp_ms)
}

/// URL of a multi-chunk manifest
pub fn manifest_url(content_id: &str, chunks: usize, timestamp_ms: i64) -> String {
    format!("{}?contentId={}&chunks={}&_t={}", MANIFEST_PATH, content_id, chunks, timestamp_ms)
}

/// Answer to a manifest request
#[derive(Debug)]
pub enum ManifestOutcome {
    /// Single-chunk text, synthesized right away
    Audio {
        audio: SynthesizedAudio,
        total_length: usize,
    },
    /// Multi-chunk plan
    Manifest(ChunkManifest),
}

/// Audio for one chunk of a plan
#[derive(Debug)]
pub struct ChunkAudio {
    pub audio: SynthesizedAudio,
    pub index: usize,
    pub total_chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub requests_per_minute: u64,
    /// Lower bound for synthesizing every chunk, e.g. `"4s"`
    pub estimated_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceData {
    pub audio_url: String,
    pub summary_text: String,
    pub chunk_count: usize,
    pub total_length: usize,
    pub is_chunked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_info: Option<RateLimitInfo>,
}

/// Body of the audio reference endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceSummary {
    pub message: String,
    pub data: ReferenceData,
    /// The stored reference was returned unchanged
    #[serde(skip)]
    pub reused: bool,
}

/// Plans chunks for content records and serves their audio
pub struct ManifestService {
    store: Arc<dyn ContentStore>,
    synthesis: SynthesisClient,
    chunker: TextChunker,
}

impl ManifestService {
    pub fn new(store: Arc<dyn ContentStore>, synthesis: SynthesisClient, chunker: TextChunker) -> Self {
        Self {
            store,
            synthesis,
            chunker,
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn synthesis(&self) -> &SynthesisClient {
        &self.synthesis
    }

    /// Load the record and cut its readable text into chunks
    pub async fn plan(&self, content_id: &str) -> Result<ChunkPlan, ServerError> {
        let record = self
            .store
            .get_content(content_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Content not found: {}", content_id)))?;

        let text = readable_text(&record)
            .ok_or_else(|| Error::not_found(format!("No summary found for content {}", content_id)))?;

        let plan = self.chunker.plan(content_id, &text);
        tracing::debug!(
            content_id,
            chunks = plan.total_chunks(),
            chars = plan.total_text_length(),
            sizes = ?plan.chunk_sizes(),
            "Planned chunks"
        );
        Ok(plan)
    }

    /// Return the stored reference, or create and store a new one
    ///
    /// A stored reference is only replaced when `force` is set. One that no
    /// longer matches the plan's shape is left in place and the current plan
    /// is described by an unsaved reference instead.
    async fn resolve_reference(
        &self,
        plan: &ChunkPlan,
        force: bool,
    ) -> Result<(AudioReference, bool), ServerError> {
        let content_id = plan.content_id.as_str();

        let stored = if force {
            None
        } else {
            self.store.get_audio_reference(content_id).await?
        };

        match stored {
            Some(existing) if reference_matches(&existing, plan) => return Ok((existing, true)),
            Some(existing) => {
                tracing::info!(
                    content_id,
                    stored_kind = existing.kind.as_str(),
                    stored_chunks = existing.total_chunks,
                    planned_chunks = plan.total_chunks(),
                    "Stored audio reference differs from the current plan, keeping it"
                );
                return Ok((plan_reference(plan), false));
            }
            None => {}
        }

        let reference = plan_reference(plan);
        self.store.save_audio_reference(content_id, &reference).await?;
        tracing::info!(
            content_id,
            kind = reference.kind.as_str(),
            chunks = reference.total_chunks,
            forced = force,
            "Audio reference stored"
        );
        Ok((reference, false))
    }

    /// Audio for single-chunk text, otherwise the chunk manifest
    pub async fn manifest(&self, content_id: &str, force: bool) -> Result<ManifestOutcome, ServerError> {
        let plan = self.plan(content_id).await?;

        if plan.is_single() {
            let chunk = first_chunk(&plan)?;
            let audio = self.synthesis.synthesize(&chunk.text).await?;
            // Only record a direct reference once its audio exists
            self.resolve_reference(&plan, force).await?;
            return Ok(ManifestOutcome::Audio {
                audio,
                total_length: plan.total_text_length(),
            });
        }

        let (reference, _) = self.resolve_reference(&plan, force).await?;
        Ok(ManifestOutcome::Manifest(build_manifest(&plan, &reference)))
    }

    /// Synthesize one chunk of the plan
    ///
    /// In a multi-chunk plan a failed chunk is replaced by silence so the rest
    /// of the narration still plays. A single-chunk plan has nothing to fall
    /// back on and reports the failure.
    pub async fn chunk(&self, content_id: &str, index: usize) -> Result<ChunkAudio, ServerError> {
        let plan = self.plan(content_id).await?;
        let total_chunks = plan.total_chunks();

        let chunk = plan.chunk(index).ok_or_else(|| {
            Error::validation(format!(
                "Invalid chunk index: {}. Available chunks: 0-{}",
                index,
                total_chunks.saturating_sub(1)
            ))
        })?;

        let audio = if plan.is_single() {
            self.synthesis.synthesize(&chunk.text).await?
        } else {
            self.synthesis.synthesize_or_silence(&chunk.text).await?
        };

        if audio.fallback {
            tracing::warn!(content_id, index, total_chunks, "Served silence for chunk");
        }

        Ok(ChunkAudio {
            audio,
            index,
            total_chunks,
        })
    }

    /// Where the audio for a record lives, without synthesizing anything
    pub async fn reference(&self, content_id: &str, force: bool) -> Result<ReferenceSummary, ServerError> {
        let plan = self.plan(content_id).await?;
        let (reference, reused) = self.resolve_reference(&plan, force).await?;
        let is_chunked = reference.is_chunked();

        let rate_limit_info = is_chunked.then(|| {
            let limiter = self.synthesis.limiter();
            let config = limiter.config();
            let requests_per_minute = if config.window_ms == 0 {
                config.max_requests_per_window as u64
            } else {
                config.max_requests_per_window as u64 * 60_000 / config.window_ms
            };
            let estimate = limiter.estimated_duration(plan.total_chunks());
            RateLimitInfo {
                requests_per_minute,
                estimated_time: format!("{}s", estimate.as_millis().div_ceil(1000)),
            }
        });

        let message = if reused {
            "Audio summary found"
        } else {
            "Audio prepared successfully"
        };

        Ok(ReferenceSummary {
            message: message.to_string(),
            data: ReferenceData {
                audio_url: reference.url,
                summary_text: plan.source_text.clone(),
                chunk_count: plan.total_chunks(),
                total_length: plan.total_text_length(),
                is_chunked,
                rate_limit_info,
            },
            reused,
        })
    }
}

fn first_chunk(plan: &ChunkPlan) -> Result<&narrator_core::TextChunk, ServerError> {
    plan.chunk(0)
        .ok_or_else(|| ServerError::Internal(format!("empty plan for {}", plan.content_id)))
}

/// Fresh reference describing the plan
fn plan_reference(plan: &ChunkPlan) -> AudioReference {
    let now = Utc::now();
    let content_id = plan.content_id.as_str();
    if plan.is_single() {
        AudioReference::direct(chunk_url(content_id, 0, now.timestamp_millis()), now)
    } else {
        let chunks = plan.total_chunks();
        AudioReference::manifest(manifest_url(content_id, chunks, now.timestamp_millis()), chunks, now)
    }
}

fn reference_matches(reference: &AudioReference, plan: &ChunkPlan) -> bool {
    match reference.kind {
        ReferenceKind::Direct => plan.is_single(),
        ReferenceKind::Manifest => !plan.is_single() && reference.total_chunks == plan.total_chunks(),
    }
}

fn build_manifest(plan: &ChunkPlan, reference: &AudioReference) -> ChunkManifest {
    let timestamp = Utc::now().timestamp_millis();
    let chunk_urls = (0..plan.total_chunks())
        .map(|i| chunk_url(&plan.content_id, i, timestamp))
        .collect();

    ChunkManifest {
        kind: ManifestKind::ChunkedAudio,
        total_chunks: plan.total_chunks(),
        chunk_urls,
        metadata: ManifestMetadata {
            content_id: plan.content_id.clone(),
            total_length: plan.total_text_length(),
            chunk_sizes: plan.chunk_sizes(),
        },
        created_at: reference.created_at,
        audio_reference: Some(reference.url.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrator_config::{FallbackConfig, RetryConfig};
    use narrator_core::ContentRecord;
    use narrator_persistence::InMemoryContentStore;
    use narrator_pipeline::{RateLimiter, StubProvider};

    const SENTENCE: &str = "Rust audio chunks keep each request below the provider cap.";

    fn long_text() -> String {
        let mut parts = vec![SENTENCE; 8];
        parts.push("Thanks for the time.");
        parts.join(" ")
    }

    fn service(provider: Arc<StubProvider>) -> ManifestService {
        let store = InMemoryContentStore::with_records([
            ContentRecord::new("short").with_summary("A short note that fits."),
            ContentRecord::new("long").with_summary(long_text()),
            ContentRecord::new("empty"),
        ]);
        let synthesis = SynthesisClient::new(
            provider,
            Arc::new(RateLimiter::disabled()),
            RetryConfig::default(),
            FallbackConfig::default(),
        );
        ManifestService::new(Arc::new(store), synthesis, TextChunker::new(180))
    }

    #[test]
    fn test_validate_content_id() {
        assert_eq!(validate_content_id(Some(" abc-1.2_x ")).unwrap(), "abc-1.2_x");
        assert!(validate_content_id(None).is_err());
        assert!(validate_content_id(Some("")).is_err());
        assert!(validate_content_id(Some("a/b")).is_err());
        assert!(validate_content_id(Some(&"a".repeat(129))).is_err());
    }

    #[tokio::test]
    async fn test_single_chunk_returns_audio() {
        let provider = Arc::new(StubProvider::new(8000));
        let service = service(provider.clone());

        match service.manifest("short", false).await.unwrap() {
            ManifestOutcome::Audio { audio, total_length } => {
                assert!(!audio.fallback);
                assert_eq!(total_length, "A short note that fits.".len());
            }
            ManifestOutcome::Manifest(_) => panic!("expected direct audio"),
        }
        assert_eq!(provider.calls(), 1);

        let stored = service.store().get_audio_reference("short").await.unwrap().unwrap();
        assert_eq!(stored.kind, ReferenceKind::Direct);
        assert!(stored.url.starts_with("/audio-chunk?contentId=short&chunk=0&_t="));
    }

    #[tokio::test]
    async fn test_multi_chunk_manifest_is_lazy() {
        let provider = Arc::new(StubProvider::new(8000));
        let service = service(provider.clone());

        let manifest = match service.manifest("long", false).await.unwrap() {
            ManifestOutcome::Manifest(m) => m,
            ManifestOutcome::Audio { .. } => panic!("expected manifest"),
        };

        assert!(manifest.is_consistent());
        assert_eq!(manifest.total_chunks, 3);
        assert_eq!(manifest.chunk_sizes(), &[179, 179, 140]);
        assert_eq!(manifest.total_text_length(), 500);
        assert!(manifest.chunk_urls[2].starts_with("/audio-chunk?contentId=long&chunk=2&_t="));
        assert!(manifest
            .audio_reference
            .as_deref()
            .unwrap()
            .starts_with("/audio-manifest?contentId=long&chunks=3&_t="));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_reference_reused_unless_forced() {
        let service = service(Arc::new(StubProvider::new(8000)));

        let first = service.reference("long", false).await.unwrap();
        assert!(!first.reused);
        assert_eq!(first.message, "Audio prepared successfully");
        assert!(first.data.is_chunked);
        assert_eq!(first.data.chunk_count, 3);
        assert!(first.data.rate_limit_info.is_some());

        let second = service.reference("long", false).await.unwrap();
        assert!(second.reused);
        assert_eq!(second.message, "Audio summary found");
        assert_eq!(second.data.audio_url, first.data.audio_url);

        let stored_before = service.store().get_audio_reference("long").await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let forced = service.reference("long", true).await.unwrap();
        assert!(!forced.reused);
        let stored_after = service.store().get_audio_reference("long").await.unwrap().unwrap();
        assert!(stored_after.created_at > stored_before.created_at);
    }

    #[tokio::test]
    async fn test_changed_summary_keeps_stored_reference() {
        let service = service(Arc::new(StubProvider::new(8000)));
        service
            .store()
            .put_content(&ContentRecord::new("c").with_summary("A short note that fits."))
            .await
            .unwrap();

        service.reference("c", false).await.unwrap();
        let stored_before = service.store().get_audio_reference("c").await.unwrap().unwrap();
        assert_eq!(stored_before.kind, ReferenceKind::Direct);

        service
            .store()
            .put_content(&ContentRecord::new("c").with_summary(long_text()))
            .await
            .unwrap();

        let summary = service.reference("c", false).await.unwrap();
        assert!(summary.data.is_chunked);
        assert_eq!(summary.data.chunk_count, 3);
        assert!(summary.data.audio_url.starts_with("/audio-manifest?contentId=c&chunks=3&_t="));

        let manifest = match service.manifest("c", false).await.unwrap() {
            ManifestOutcome::Manifest(m) => m,
            ManifestOutcome::Audio { .. } => panic!("expected manifest"),
        };
        assert_eq!(manifest.total_chunks, 3);

        let stored_after = service.store().get_audio_reference("c").await.unwrap().unwrap();
        assert_eq!(stored_after, stored_before);

        service.reference("c", true).await.unwrap();
        let forced = service.store().get_audio_reference("c").await.unwrap().unwrap();
        assert_eq!(forced.kind, ReferenceKind::Manifest);
        assert_eq!(forced.total_chunks, 3);
    }

    #[tokio::test]
    async fn test_chunk_out_of_range() {
        let service = service(Arc::new(StubProvider::new(8000)));
        let err = service.chunk("long", 3).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid chunk index: 3. Available chunks: 0-2");
    }

    #[tokio::test]
    async fn test_missing_content_and_summary() {
        let service = service(Arc::new(StubProvider::new(8000)));
        assert!(matches!(
            service.manifest("nope", false).await,
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            service.manifest("empty", false).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_falls_back_alone() {
        // Only the third chunk contains "Thanks"
        let provider = Arc::new(StubProvider::new(8000).failing_on(["Thanks"]));
        let service = service(provider.clone());

        let first = service.chunk("long", 0).await.unwrap();
        assert!(!first.audio.fallback);
        assert_eq!(first.total_chunks, 3);

        let last = service.chunk("long", 2).await.unwrap();
        assert!(last.audio.fallback);
        assert_eq!(provider.calls(), 1 + 3);

        let middle = service.chunk("long", 1).await.unwrap();
        assert!(!middle.audio.fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_chunk_failure_is_an_error() {
        let provider = Arc::new(StubProvider::new(8000).failing_on(["short"]));
        let service = service(provider);

        assert!(matches!(
            service.manifest("short", false).await,
            Err(ServerError::Upstream(_))
        ));
        assert!(matches!(service.chunk("short", 0).await, Err(ServerError::Upstream(_))));
        assert!(service.store().get_audio_reference("short").await.unwrap().is_none());
    }
}

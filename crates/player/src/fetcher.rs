//! Chunk fetching over HTTP

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use narrator_core::ChunkManifest;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Response;
use serde::Deserialize;

use crate::error::PlayerError;

/// Audio for one chunk as delivered by the server
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedChunk {
    pub bytes: Bytes,
    pub content_type: String,
    pub index: usize,
    pub total_chunks: usize,
    /// Silence substituted for a chunk the server could not synthesize
    pub fallback: bool,
}

/// What the manifest endpoint answered
#[derive(Debug, Clone)]
pub enum PlaybackSource {
    /// Short text, audio returned directly
    Single(FetchedChunk),
    /// One URL per chunk, fetched lazily
    Chunked(ChunkManifest),
}

impl PlaybackSource {
    pub fn total_chunks(&self) -> usize {
        match self {
            PlaybackSource::Single(_) => 1,
            PlaybackSource::Chunked(manifest) => manifest.total_chunks,
        }
    }
}

/// Source of chunk audio
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    /// Ask the server how the content's audio is delivered
    async fn resolve(&self, content_id: &str, force: bool) -> Result<PlaybackSource, PlayerError>;

    /// Download one chunk URL taken from a manifest
    async fn fetch_chunk(&self, url: &str) -> Result<FetchedChunk, PlayerError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`ChunkFetcher`] against a narration server
#[derive(Debug, Clone)]
pub struct HttpChunkFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChunkFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PlayerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Manifest URLs are server-relative
    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    async fn checked(response: Response) -> Result<Response, PlayerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        Err(PlayerError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<usize> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

async fn audio_body(response: Response) -> Result<(String, bool, Bytes), PlayerError> {
    let content_type = content_type(response.headers());
    if !content_type.starts_with("audio/") {
        return Err(PlayerError::UnsupportedContent(content_type));
    }
    let fallback = response.headers().contains_key("x-chunk-fallback");

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(PlayerError::InvalidResponse("empty audio body".to_string()));
    }
    Ok((content_type, fallback, bytes))
}

#[async_trait]
impl ChunkFetcher for HttpChunkFetcher {
    async fn resolve(&self, content_id: &str, force: bool) -> Result<PlaybackSource, PlayerError> {
        let mut request = self
            .client
            .get(self.absolute("/audio-manifest"))
            .query(&[("contentId", content_id)]);
        if force {
            request = request.query(&[("force", "true")]);
        }

        let response = Self::checked(request.send().await?).await?;

        if content_type(response.headers()).starts_with("application/json") {
            let manifest: ChunkManifest = response
                .json()
                .await
                .map_err(|e| PlayerError::InvalidResponse(e.to_string()))?;
            if !manifest.is_consistent() || manifest.total_chunks == 0 {
                return Err(PlayerError::InvalidResponse(format!(
                    "manifest for {} lists {} chunks but {} URLs",
                    content_id,
                    manifest.total_chunks,
                    manifest.chunk_urls.len()
                )));
            }
            tracing::debug!(content_id, chunks = manifest.total_chunks, "Resolved chunk manifest");
            return Ok(PlaybackSource::Chunked(manifest));
        }

        let (content_type, fallback, bytes) = audio_body(response).await?;
        tracing::debug!(content_id, bytes = bytes.len(), "Resolved single chunk audio");
        Ok(PlaybackSource::Single(FetchedChunk {
            bytes,
            content_type,
            index: 0,
            total_chunks: 1,
            fallback,
        }))
    }

    async fn fetch_chunk(&self, url: &str) -> Result<FetchedChunk, PlayerError> {
        let response = Self::checked(self.client.get(self.absolute(url)).send().await?).await?;

        let headers = response.headers();
        let index = header_number(headers, "x-chunk-index")
            .ok_or_else(|| PlayerError::InvalidResponse("missing X-Chunk-Index".to_string()))?;
        let total_chunks = header_number(headers, "x-total-chunks")
            .ok_or_else(|| PlayerError::InvalidResponse("missing X-Total-Chunks".to_string()))?;

        let (content_type, fallback, bytes) = audio_body(response).await?;
        if fallback {
            tracing::warn!(index, "Server substituted silence for chunk");
        }

        Ok(FetchedChunk {
            bytes,
            content_type,
            index,
            total_chunks,
            fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_urls() {
        let fetcher = HttpChunkFetcher::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(fetcher.base_url(), "http://localhost:8080");
        assert_eq!(
            fetcher.absolute("/audio-chunk?contentId=a&chunk=0"),
            "http://localhost:8080/audio-chunk?contentId=a&chunk=0"
        );
        assert_eq!(fetcher.absolute("https://cdn.test/a.mp3"), "https://cdn.test/a.mp3");
    }

    #[test]
    fn test_header_number() {
        let mut headers = HeaderMap::new();
        headers.insert("x-chunk-index", "2".parse().unwrap());
        headers.insert("x-total-chunks", "many".parse().unwrap());
        assert_eq!(header_number(&headers, "x-chunk-index"), Some(2));
        assert_eq!(header_number(&headers, "x-total-chunks"), None);
        assert_eq!(header_number(&headers, "x-missing"), None);
    }

    #[test]
    fn test_source_chunk_count() {
        let single = PlaybackSource::Single(FetchedChunk {
            bytes: Bytes::from_static(b"RIFF"),
            content_type: "audio/wav".into(),
            index: 0,
            total_chunks: 1,
            fallback: false,
        });
        assert_eq!(single.total_chunks(), 1);
    }
}

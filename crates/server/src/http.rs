//! HTTP Endpoints
//!
//! REST API for chunked narration audio.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use narrator_core::SynthesizedAudio;
use serde::Deserialize;
use tower_http::compression::predicate::{DefaultPredicate, NotForContentType, Predicate};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::manifest::{validate_content_id, ManifestOutcome, CHUNK_PATH, MANIFEST_PATH, REFERENCE_PATH};
use crate::metrics::{metrics_handler, record_chunk_served, record_error, record_manifest_chunks, record_request};
use crate::state::AppState;
use crate::ServerError;

const X_CHUNK_COUNT: HeaderName = HeaderName::from_static("x-chunk-count");
const X_TOTAL_LENGTH: HeaderName = HeaderName::from_static("x-total-length");
const X_CHUNK_INDEX: HeaderName = HeaderName::from_static("x-chunk-index");
const X_TOTAL_CHUNKS: HeaderName = HeaderName::from_static("x-total-chunks");
const X_CHUNK_FALLBACK: HeaderName = HeaderName::from_static("x-chunk-fallback");

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;

    let cors = (if server.cors_origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .cors_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    })
    .allow_methods(Any)
    .allow_headers(Any)
    .expose_headers([
        X_CHUNK_COUNT,
        X_TOTAL_LENGTH,
        X_CHUNK_INDEX,
        X_TOTAL_CHUNKS,
        X_CHUNK_FALLBACK,
    ]);

    // Audio is already compressed
    let compression = CompressionLayer::new()
        .compress_when(DefaultPredicate::new().and(NotForContentType::const_new("audio/")));

    let mut router = Router::new()
        // Narration endpoints
        .route(MANIFEST_PATH, get(audio_manifest))
        .route(CHUNK_PATH, get(audio_chunk))
        .route(REFERENCE_PATH, get(audio_reference))

        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))

        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(compression)
        .layer(TimeoutLayer::new(Duration::from_secs(server.timeout_seconds)));

    if server.cors_enabled {
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// Query for the manifest and reference endpoints
#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    #[serde(rename = "contentId", alias = "content_id")]
    content_id: Option<String>,
    force: Option<String>,
}

impl ContentQuery {
    fn force(&self) -> bool {
        self.force.as_deref() == Some("true")
    }
}

/// Query for the chunk endpoint
#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    #[serde(rename = "contentId", alias = "content_id")]
    content_id: Option<String>,
    chunk: Option<String>,
}

fn parse_chunk_index(raw: Option<&str>) -> Result<usize, ServerError> {
    let raw = raw
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ServerError::InvalidRequest("Please provide a chunk index".to_string()))?;
    raw.parse::<usize>()
        .map_err(|_| ServerError::InvalidRequest(format!("Invalid chunk index: {}", raw)))
}

fn header_value(value: impl ToString) -> HeaderValue {
    // Decimal numbers and fixed tokens are always valid header values
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Audio body with the caching headers every audio response carries
fn audio_response(audio: SynthesizedAudio, mut headers: HeaderMap) -> Response {
    let content_type = HeaderValue::from_str(&audio.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("audio/mpeg"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, header_value(audio.len()));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));
    if audio.fallback {
        headers.insert(X_CHUNK_FALLBACK, HeaderValue::from_static("silence"));
    }
    (StatusCode::OK, headers, audio.bytes).into_response()
}

fn track(err: ServerError) -> ServerError {
    record_error(err.kind());
    err
}

/// Direct audio for single-chunk text, a chunk manifest otherwise
async fn audio_manifest(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> Result<Response, ServerError> {
    record_request("manifest");
    let content_id = validate_content_id(query.content_id.as_deref()).map_err(track)?;

    let outcome = state
        .manifests
        .manifest(&content_id, query.force())
        .await
        .map_err(track)?;

    match outcome {
        ManifestOutcome::Audio { audio, total_length } => {
            tracing::info!(content_id = %content_id, bytes = audio.len(), "Serving single chunk audio directly");
            record_chunk_served(audio.fallback);
            let mut headers = HeaderMap::new();
            headers.insert(X_CHUNK_COUNT, HeaderValue::from_static("1"));
            headers.insert(X_TOTAL_LENGTH, header_value(total_length));
            Ok(audio_response(audio, headers))
        }
        ManifestOutcome::Manifest(manifest) => {
            tracing::info!(content_id = %content_id, chunks = manifest.total_chunks, "Serving chunk manifest");
            record_manifest_chunks(manifest.total_chunks);
            let mut headers = HeaderMap::new();
            headers.insert(X_CHUNK_COUNT, header_value(manifest.total_chunks));
            headers.insert(X_TOTAL_LENGTH, header_value(manifest.total_text_length()));
            Ok((StatusCode::OK, headers, Json(manifest)).into_response())
        }
    }
}

/// Audio for one chunk of a plan
async fn audio_chunk(
    State(state): State<AppState>,
    Query(query): Query<ChunkQuery>,
) -> Result<Response, ServerError> {
    record_request("chunk");
    let content_id = validate_content_id(query.content_id.as_deref()).map_err(track)?;
    let index = parse_chunk_index(query.chunk.as_deref()).map_err(track)?;

    let chunk = state.manifests.chunk(&content_id, index).await.map_err(track)?;
    record_chunk_served(chunk.audio.fallback);

    let mut headers = HeaderMap::new();
    headers.insert(X_CHUNK_INDEX, header_value(chunk.index));
    headers.insert(X_TOTAL_CHUNKS, header_value(chunk.total_chunks));
    Ok(audio_response(chunk.audio, headers))
}

/// Where a record's audio lives
async fn audio_reference(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> Result<Response, ServerError> {
    record_request("reference");
    let content_id = validate_content_id(query.content_id.as_deref()).map_err(track)?;

    let summary = state
        .manifests
        .reference(&content_id, query.force())
        .await
        .map_err(track)?;

    let mut headers = HeaderMap::new();
    if summary.data.is_chunked {
        let warning = format!(
            "This request will make {} TTS calls. Please be aware of rate limits.",
            summary.data.chunk_count
        );
        if let Ok(value) = HeaderValue::from_str(&warning) {
            headers.insert(HeaderName::from_static("x-rate-limit-warning"), value);
        }
    }
    Ok((StatusCode::OK, headers, Json(summary)).into_response())
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "store": state.manifests.store().backend(),
        "provider": state.manifests.synthesis().provider_name(),
        "rateLimit": state.limiter.snapshot(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrator_config::Settings;
    use narrator_persistence::InMemoryContentStore;
    use narrator_pipeline::{RateLimiter, StubProvider};
    use std::sync::Arc;

    #[test]
    fn test_router_creation() {
        let state = AppState::new(
            Settings::default(),
            Arc::new(InMemoryContentStore::new()),
            Arc::new(StubProvider::new(8000)),
            Arc::new(RateLimiter::disabled()),
        );
        let _ = create_router(state);
    }

    #[test]
    fn test_parse_chunk_index() {
        assert_eq!(parse_chunk_index(Some("2")).unwrap(), 2);
        assert!(parse_chunk_index(None).is_err());
        assert!(parse_chunk_index(Some("")).is_err());
        assert_eq!(
            parse_chunk_index(Some("-1")).unwrap_err().to_string(),
            "Invalid chunk index: -1"
        );
    }

    #[test]
    fn test_force_flag() {
        let query = ContentQuery {
            content_id: Some("c".into()),
            force: Some("true".into()),
        };
        assert!(query.force());
        let query = ContentQuery {
            content_id: Some("c".into()),
            force: Some("1".into()),
        };
        assert!(!query.force());
    }
}

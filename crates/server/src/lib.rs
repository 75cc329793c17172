//! Narrator Server
//!
//! HTTP endpoints that plan, synthesize and serve chunked narration audio.

pub mod http;
pub mod manifest;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use manifest::{ChunkAudio, ManifestOutcome, ManifestService, ReferenceSummary};
pub use metrics::init_metrics;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use narrator_persistence::PersistenceError;
use narrator_pipeline::PipelineError;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to generate audio: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Machine-readable error kind for response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::NotFound(_) => "not_found",
            ServerError::Upstream(_) => "upstream_failure",
            ServerError::Persistence(_) => "storage_failure",
            ServerError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Upstream(_) | ServerError::Persistence(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Request rejected");
        }
        let body = Json(serde_json::json!({
            "message": self.to_string(),
            "error": self.kind(),
        }));
        (status, body).into_response()
    }
}

impl From<narrator_core::Error> for ServerError {
    fn from(err: narrator_core::Error) -> Self {
        use narrator_core::Error;
        match err {
            Error::Validation(msg) => ServerError::InvalidRequest(msg),
            Error::NotFound(msg) => ServerError::NotFound(msg),
            Error::UpstreamSynthesis { .. } => ServerError::Upstream(err.to_string()),
            Error::Persistence(msg) => ServerError::Persistence(msg),
            Error::Other(msg) => ServerError::Internal(msg),
        }
    }
}

// Lower crates report through the shared taxonomy
impl From<PersistenceError> for ServerError {
    fn from(err: PersistenceError) -> Self {
        narrator_core::Error::from(err).into()
    }
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        narrator_core::Error::from(err).into()
    }
}

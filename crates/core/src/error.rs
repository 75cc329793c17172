//! Error types for the narrator

use thiserror::Error;

/// Main error type shared across crates
///
/// The variants follow the externally visible taxonomy: validation problems
/// become `400`, missing source text becomes `404`, and exhausted upstream
/// retries become either a per-chunk fallback or a `500`, depending on the
/// caller.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing content id, out-of-range chunk index
    #[error("{0}")]
    Validation(String),

    /// No source text for the requested content
    #[error("{0}")]
    NotFound(String),

    /// Upstream synthesis failed after every retry
    #[error("Upstream synthesis failed after {attempts} attempts: {message}")]
    UpstreamSynthesis { attempts: u32, message: String },

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    /// Is this a caller error (bad input) rather than a service fault?
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound(_))
    }
}

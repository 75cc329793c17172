//! Player errors and media failure categories

use std::fmt;

use thiserror::Error;

/// Why a chunk could not be played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFailure {
    /// Loading was interrupted before the chunk was ready
    Aborted,
    /// The chunk could not be downloaded
    Network,
    /// The bytes arrived but could not be decoded
    Decode,
    /// The server returned something that is not playable audio
    UnsupportedFormat,
}

impl MediaFailure {
    /// Message suitable for showing next to the player
    pub fn user_message(&self) -> &'static str {
        match self {
            MediaFailure::Aborted => "Audio loading was interrupted. Please try again.",
            MediaFailure::Network => {
                "A network error stopped this part of the audio from loading. Please check your connection and retry."
            }
            MediaFailure::Decode => "This part of the audio could not be decoded. Please retry.",
            MediaFailure::UnsupportedFormat => {
                "This part of the audio is not available in a playable format."
            }
        }
    }

    /// Worth retrying without asking the user
    pub fn is_transient(&self) -> bool {
        matches!(self, MediaFailure::Aborted | MediaFailure::Network)
    }
}

impl fmt::Display for MediaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaFailure::Aborted => "aborted",
            MediaFailure::Network => "network",
            MediaFailure::Decode => "decode",
            MediaFailure::UnsupportedFormat => "unsupported_format",
        };
        f.write_str(name)
    }
}

/// Player errors
#[derive(Error, Debug, Clone)]
pub enum PlayerError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),

    #[error("No audio source loaded")]
    NoSource,
}

impl PlayerError {
    /// Category reported to the playback engine when a chunk fetch fails
    pub fn failure(&self) -> MediaFailure {
        match self {
            PlayerError::Http(_) => MediaFailure::Network,
            PlayerError::Status { status, .. } => {
                if *status >= 500 || *status == 408 || *status == 429 {
                    MediaFailure::Network
                } else {
                    MediaFailure::UnsupportedFormat
                }
            }
            PlayerError::InvalidResponse(_) => MediaFailure::Decode,
            PlayerError::UnsupportedContent(_) => MediaFailure::UnsupportedFormat,
            PlayerError::NoSource => MediaFailure::Aborted,
        }
    }
}

impl From<reqwest::Error> for PlayerError {
    fn from(err: reqwest::Error) -> Self {
        PlayerError::Http(err.to_string())
    }
}

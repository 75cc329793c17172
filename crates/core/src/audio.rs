//! Synthesized audio payloads

use bytes::Bytes;

/// Default content type when the provider does not send one
pub const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Audio produced for one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Bytes,
    pub content_type: String,
    /// Silence substituted after the provider failed
    pub fallback: bool,
}

impl SynthesizedAudio {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            fallback: false,
        }
    }

    /// Mark as a silence substitute
    pub fn into_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_flag() {
        let audio = SynthesizedAudio::new(vec![0u8; 4], DEFAULT_AUDIO_CONTENT_TYPE);
        assert!(!audio.fallback);
        assert_eq!(audio.len(), 4);
        assert!(audio.into_fallback().fallback);
    }
}

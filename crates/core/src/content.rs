//! Content records read from the external store

use serde::{Deserialize, Serialize};

/// Kind of content a summary was generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    YoutubeContent,
    DocumentContent,
    AudioContent,
    ImageContent,
    #[default]
    Other,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YoutubeContent => "YOUTUBE_CONTENT",
            Self::DocumentContent => "DOCUMENT_CONTENT",
            Self::AudioContent => "AUDIO_CONTENT",
            Self::ImageContent => "IMAGE_CONTENT",
            Self::Other => "OTHER",
        }
    }

    /// Parse the stored column value; unknown values map to `Other`
    pub fn parse(value: &str) -> Self {
        match value {
            "YOUTUBE_CONTENT" => Self::YoutubeContent,
            "DOCUMENT_CONTENT" => Self::DocumentContent,
            "AUDIO_CONTENT" => Self::AudioContent,
            "IMAGE_CONTENT" => Self::ImageContent,
            _ => Self::Other,
        }
    }
}

/// Read-only view of a content record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: String,
    #[serde(default)]
    pub content_type: ContentType,
    /// Summary text; may be a JSON document of sections
    #[serde(default)]
    pub summary: Option<String>,
    /// Title or filename, used when no usable summary exists
    #[serde(default)]
    pub title: Option<String>,
}

impl ContentRecord {
    pub fn new(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            content_type: ContentType::Other,
            summary: None,
            title: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_title(mut self, content_type: ContentType, title: impl Into<String>) -> Self {
        self.content_type = content_type;
        self.title = Some(title.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_roundtrip() {
        for kind in [
            ContentType::YoutubeContent,
            ContentType::DocumentContent,
            ContentType::AudioContent,
            ContentType::ImageContent,
        ] {
            assert_eq!(ContentType::parse(kind.as_str()), kind);
        }
        assert_eq!(ContentType::parse("PODCAST"), ContentType::Other);
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let record: ContentRecord = serde_json::from_str(r#"{"content_id":"c9"}"#).unwrap();
        assert_eq!(record.content_type, ContentType::Other);
        assert!(record.summary.is_none());
    }
}

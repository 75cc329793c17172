//! Readable text extraction from stored summaries
//!
//! Summaries are stored either as plain text or as JSON produced by the
//! content generator: an array of sections, an object with a `sections`
//! array, or some other object. Records without a usable summary are read
//! out as a short title sentence instead.

use narrator_core::{ContentRecord, ContentType};
use serde_json::Value;

/// Text to narrate for a record, or `None` when there is nothing to say
pub fn readable_text(record: &ContentRecord) -> Option<String> {
    record
        .summary
        .as_deref()
        .map(summary_text)
        .filter(|text| is_usable(text))
        .or_else(|| title_sentence(record))
}

/// Flatten a stored summary into prose
pub fn summary_text(summary: &str) -> String {
    match serde_json::from_str::<Value>(summary) {
        Ok(Value::Array(sections)) => join_sections(&sections),
        Ok(Value::Object(map)) => match map.get("sections") {
            Some(Value::Array(sections)) => join_sections(sections),
            _ => join_sentences(map.values().filter_map(scalar_text)),
        },
        Ok(Value::String(text)) => text,
        Ok(Value::Null) => String::new(),
        Ok(other) => other.to_string(),
        Err(_) => summary.to_string(),
    }
}

/// Sentence read out when the summary is missing or unusable
pub fn title_sentence(record: &ContentRecord) -> Option<String> {
    let title = record.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
    let sentence = match record.content_type {
        ContentType::YoutubeContent | ContentType::Other => format!("Summary of {}", title),
        ContentType::DocumentContent => format!("Summary of document {}", title),
        ContentType::AudioContent => format!("Summary of audio {}", title),
        ContentType::ImageContent => format!("Summary of image {}", title),
    };
    Some(sentence)
}

fn is_usable(text: &str) -> bool {
    !text.trim().is_empty() && !text.contains("[object Object]")
}

fn join_sections(sections: &[Value]) -> String {
    join_sentences(sections.iter().filter_map(|section| match section {
        Value::Object(map) => map.get("content").and_then(scalar_text),
        other => scalar_text(other),
    }))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Join parts with `". "`, without doubling punctuation already present
fn join_sentences(parts: impl Iterator<Item = String>) -> String {
    let mut out = String::new();
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() {
            if out.ends_with(['.', '!', '?']) {
                out.push(' ');
            } else {
                out.push_str(". ");
            }
        }
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(summary: Option<&str>) -> ContentRecord {
        ContentRecord {
            content_id: "c1".to_string(),
            content_type: ContentType::DocumentContent,
            summary: summary.map(str::to_string),
            title: Some("report.pdf".to_string()),
        }
    }

    #[test]
    fn test_plain_summary_used_verbatim() {
        assert_eq!(summary_text("Just prose, not JSON."), "Just prose, not JSON.");
    }

    #[test]
    fn test_section_array_joined() {
        let json = r#"[{"title":"A","content":"First part"},{"content":"Second part."},"Third"]"#;
        assert_eq!(summary_text(json), "First part. Second part. Third");
    }

    #[test]
    fn test_sections_object_joined() {
        let json = r#"{"sections":[{"content":"Alpha"},{"content":null},{"content":"Beta"}]}"#;
        assert_eq!(summary_text(json), "Alpha. Beta");
    }

    #[test]
    fn test_other_object_joins_scalar_fields() {
        let json = r#"{"headline":"Quarterly results","pages":12,"nested":{"x":1}}"#;
        assert_eq!(summary_text(json), "Quarterly results. 12");
    }

    #[test]
    fn test_title_fallback_per_content_type() {
        let mut r = record(None);
        assert_eq!(readable_text(&r).unwrap(), "Summary of document report.pdf");

        r.content_type = ContentType::AudioContent;
        assert_eq!(readable_text(&r).unwrap(), "Summary of audio report.pdf");

        r.content_type = ContentType::YoutubeContent;
        assert_eq!(readable_text(&r).unwrap(), "Summary of report.pdf");
    }

    #[test]
    fn test_corrupted_summary_falls_back_to_title() {
        let r = record(Some("The [object Object] was here"));
        assert_eq!(readable_text(&r).unwrap(), "Summary of document report.pdf");
    }

    #[test]
    fn test_empty_sections_fall_back_to_title() {
        let r = record(Some(r#"{"sections":[]}"#));
        assert_eq!(readable_text(&r).unwrap(), "Summary of document report.pdf");
    }

    #[test]
    fn test_nothing_to_read() {
        let mut r = record(None);
        r.title = None;
        assert!(readable_text(&r).is_none());
    }
}

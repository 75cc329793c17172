//! Sentence-level chunking for TTS
//!
//! Splits text into pieces no longer than the upstream provider accepts.
//! Sentences are packed greedily; anything still too long is split on word
//! boundaries, and a single word longer than the cap is sliced by character.

use narrator_core::{ChunkPlan, TextChunk};
use once_cell::sync::Lazy;
use regex::Regex;

/// Spoken instead of text too short to synthesize
pub const DEFAULT_SENTENCE: &str =
    "This is a summary of your content. Thank you for using our system.";

/// Shortest sanitized text that is synthesized as-is
const MIN_TEXT_CHARS: usize = 5;

/// `[object Object]` and friends, left behind by careless stringification
static OBJECT_ARTIFACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[object [A-Za-z]+\]").unwrap());

/// Replace stringification artifacts with `content` and collapse whitespace
pub fn normalize(text: &str) -> String {
    let replaced = OBJECT_ARTIFACT.replace_all(text, "content");
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean raw text before chunking
///
/// Normalizes the text; anything left shorter than five characters is
/// replaced by [`DEFAULT_SENTENCE`].
pub fn sanitize(text: &str) -> String {
    let collapsed = normalize(text);

    if collapsed.chars().count() < MIN_TEXT_CHARS {
        DEFAULT_SENTENCE.to_string()
    } else {
        collapsed
    }
}

/// Cut sanitized text to at most `max_chars`, ending with `...`
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push_str("...");
    out
}

/// Splits text into provider-sized chunks
#[derive(Debug, Clone)]
pub struct TextChunker {
    max_chunk_length: usize,
    max_total_length: Option<usize>,
}

impl TextChunker {
    /// Create a chunker with the given per-chunk cap (in characters)
    pub fn new(max_chunk_length: usize) -> Self {
        Self {
            max_chunk_length: max_chunk_length.max(1),
            max_total_length: None,
        }
    }

    /// Truncate source text to this many characters before chunking
    pub fn with_total_limit(mut self, max_total_length: Option<usize>) -> Self {
        self.max_total_length = max_total_length;
        self
    }

    pub fn max_chunk_length(&self) -> usize {
        self.max_chunk_length
    }

    /// Sanitize, truncate and chunk the text for one content record
    pub fn plan(&self, content_id: &str, text: &str) -> ChunkPlan {
        let mut source = sanitize(text);
        if let Some(limit) = self.max_total_length {
            source = truncate(&source, limit);
        }
        let chunks = self.chunk_sanitized(&source);
        ChunkPlan::new(content_id, source, chunks)
    }

    /// Chunk raw text
    ///
    /// Deterministic: the same text and cap always produce the same
    /// boundaries.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        self.chunk_sanitized(&sanitize(text))
    }

    fn chunk_sanitized(&self, text: &str) -> Vec<TextChunk> {
        let max = self.max_chunk_length;
        let mut pieces: Vec<String> = Vec::new();

        for packed in pack(split_sentences(text), max) {
            if char_len(&packed) <= max {
                pieces.push(packed);
            } else {
                pieces.extend(self.split_words(&packed));
            }
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| TextChunk::new(index, text))
            .collect()
    }

    /// Greedy word packing for a chunk that is still over the cap
    fn split_words(&self, text: &str) -> Vec<String> {
        let max = self.max_chunk_length;
        let mut out = Vec::new();
        let mut buffer = String::new();

        for word in text.split_whitespace() {
            if char_len(word) > max {
                if !buffer.is_empty() {
                    out.push(std::mem::take(&mut buffer));
                }
                out.extend(hard_slice(word, max));
                continue;
            }

            if buffer.is_empty() {
                buffer.push_str(word);
            } else if char_len(&buffer) + 1 + char_len(word) <= max {
                buffer.push(' ');
                buffer.push_str(word);
            } else {
                out.push(std::mem::replace(&mut buffer, word.to_string()));
            }
        }

        if !buffer.is_empty() {
            out.push(buffer);
        }
        out
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(180)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on whitespace-delimited words that end a sentence
///
/// Trailing text without terminal punctuation becomes the last sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);

        if is_sentence_end(word) {
            sentences.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

/// Check if word ends a sentence, looking past closing quotes and brackets
fn is_sentence_end(word: &str) -> bool {
    let core = word.trim_end_matches(|c| matches!(c, '"' | '\'' | ')' | ']'));
    core.ends_with('.') || core.ends_with('!') || core.ends_with('?')
}

/// Greedily join sentences while the result fits
fn pack(sentences: Vec<String>, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buffer = String::new();

    for sentence in sentences {
        if buffer.is_empty() {
            buffer = sentence;
        } else if char_len(&buffer) + 1 + char_len(&sentence) <= max {
            buffer.push(' ');
            buffer.push_str(&sentence);
        } else {
            out.push(std::mem::replace(&mut buffer, sentence));
        }
    }

    if !buffer.is_empty() {
        out.push(buffer);
    }
    out
}

/// Slice by character count, never inside a UTF-8 sequence
fn hard_slice(word: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCE: &str = "Rust audio chunks keep each request below the provider cap.";

    fn five_hundred_chars() -> String {
        let mut parts = vec![SENTENCE; 8];
        parts.push("Thanks for the time.");
        parts.join(" ")
    }

    #[test]
    fn test_sanitize_replaces_artifacts() {
        assert_eq!(
            sanitize("Read [object Object] and   [object Array]\n now"),
            "Read content and content now"
        );
    }

    #[test]
    fn test_normalize_keeps_short_text() {
        assert_eq!(normalize("  Hi.\t"), "Hi.");
    }

    #[test]
    fn test_sanitize_short_text_uses_default() {
        assert_eq!(sanitize("  hi \n"), DEFAULT_SENTENCE);
        assert_eq!(sanitize(""), DEFAULT_SENTENCE);
        assert_eq!(sanitize("Hello"), "Hello");
    }

    #[test]
    fn test_sentence_end_detection() {
        assert!(is_sentence_end("done."));
        assert!(is_sentence_end("really?\""));
        assert!(is_sentence_end("(wow!)"));
        assert!(!is_sentence_end("e.g"));
        assert!(!is_sentence_end("Hello.World"));
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = TextChunker::new(180).chunk("One short sentence.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "One short sentence.");
    }

    #[test]
    fn test_five_hundred_chars_make_three_chunks() {
        let text = five_hundred_chars();
        assert_eq!(text.chars().count(), 500);

        let chunks = TextChunker::new(180).chunk(&text);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.char_length).collect();
        assert_eq!(sizes, vec![179, 179, 140]);

        let rejoined: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined.join(" "), text);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = TextChunker::new(60);
        let text = five_hundred_chars();
        assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
    }

    #[test]
    fn test_long_sentence_splits_on_words() {
        let text = "word ".repeat(100);
        let chunks = TextChunker::new(50).chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.char_length <= 50);
            assert!(!chunk.text.starts_with(' ') && !chunk.text.ends_with(' '));
        }
        let rejoined: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined.join(" "), sanitize(&text));
    }

    #[test]
    fn test_oversized_token_is_hard_sliced() {
        let token = "é".repeat(25);
        let chunks = TextChunker::new(10).chunk(&format!("Start. {} end.", token));
        let sizes: Vec<usize> = chunks.iter().map(|c| c.char_length).collect();
        assert_eq!(sizes, vec![6, 10, 10, 5, 4]);
        assert_eq!(chunks[4].text, "end.");
    }

    #[test]
    fn test_trailing_text_without_punctuation_kept() {
        let chunks = TextChunker::new(20).chunk("First one here. and a tail without end");
        let rejoined: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rejoined.join(" "), "First one here. and a tail without end");
    }

    #[test]
    fn test_plan_truncates_when_limited() {
        let chunker = TextChunker::new(180).with_total_limit(Some(200));
        let plan = chunker.plan("c1", &five_hundred_chars());
        assert!(plan.total_text_length() <= 200);
        assert!(plan.source_text.ends_with("..."));
        assert_eq!(plan.rejoined(), plan.source_text);
    }

    #[test]
    fn test_plan_without_limit_keeps_text() {
        let plan = TextChunker::default().plan("c1", &five_hundred_chars());
        assert_eq!(plan.total_text_length(), 500);
        assert_eq!(plan.total_chunks(), 3);
        assert_eq!(plan.content_id, "c1");
    }
}

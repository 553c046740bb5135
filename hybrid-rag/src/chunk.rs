//! Data types for retrieved chunks and router results.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata key naming the backend (or backends) a chunk came from.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding a hit's own `source` when the adapter relabels it.
pub const ORIGIN_KEY: &str = "origin";
/// Metadata key marking a chunk as a fused context.
pub const SYNTHESIZED_KEY: &str = "synthesized";
/// Metadata key holding the number of chunks fused into a context.
///
/// Stored as [`MetadataValue::Number`], so filters must match it with a
/// number (`2usize` or `2.0`, or `2` in JSON), never the text `"2"`.
pub const CHUNKS_USED_KEY: &str = "chunks_used";

/// Source label used when an adapter does not supply one.
pub const UNKNOWN_SOURCE: &str = "unknown";
/// Prefix of the source label carried by generation-fallback chunks.
pub const FALLBACK_SOURCE_PREFIX: &str = "fallback:";

/// A single metadata value attached to a [`Chunk`].
///
/// Equality is exact: `Text("1")` never equals `Number(1.0)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// A boolean flag, e.g. `synthesized`.
    Flag(bool),
    /// A numeric value, e.g. `page` or `chunks_used`.
    Number(f64),
    /// A string value, e.g. `source` or `title`.
    Text(String),
}

impl MetadataValue {
    /// Return the string value, if this is [`MetadataValue::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Return the numeric value, if this is [`MetadataValue::Number`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Return the flag value, if this is [`MetadataValue::Flag`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// Key-value metadata carried by a chunk.
pub type Metadata = HashMap<String, MetadataValue>;

/// A scored, source-tagged unit of retrieved text evidence.
///
/// Scores are only comparable between chunks that went through the same
/// rerank call. Backend-native scores are never mixed across backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The passage body. Non-empty whenever a chunk reaches a caller.
    pub content: String,
    /// Metadata; always contains [`SOURCE_KEY`].
    pub metadata: Metadata,
    /// Relevance score, conceptually in `[0, 1]`.
    pub score: f32,
}

impl Chunk {
    /// Create a chunk from `source`, stamping the source label into metadata.
    pub fn new(content: impl Into<String>, source: impl Into<String>, score: f32) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), MetadataValue::Text(source.into()));
        Self { content: content.into(), metadata, score }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The chunk's source label, or [`UNKNOWN_SOURCE`] if it has none.
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str).unwrap_or(UNKNOWN_SOURCE)
    }

    /// Whether this chunk is a fused context built from several chunks.
    pub fn is_synthesized(&self) -> bool {
        self.metadata.get(SYNTHESIZED_KEY).and_then(MetadataValue::as_bool).unwrap_or(false)
    }

    /// Number of chunks fused into this one, if it is a synthesized context.
    pub fn chunks_used(&self) -> Option<usize> {
        self.metadata.get(CHUNKS_USED_KEY).and_then(MetadataValue::as_f64).map(|n| n as usize)
    }
}

/// The terminal artifact returned by the hybrid router.
///
/// Either evidence chunks, a single fallback chunk tagged
/// `fallback:<reason>`, or nothing at all when fallback is disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The returned chunks.
    pub chunks: Vec<Chunk>,
}

impl RetrievalResult {
    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result wrapping evidence chunks.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    /// Whether no chunks were returned.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of returned chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether this result is a generation-fallback answer.
    pub fn is_fallback(&self) -> bool {
        self.fallback_reason().is_some()
    }

    /// The fallback reason, e.g. `empty-retrieval`, when this is a fallback answer.
    pub fn fallback_reason(&self) -> Option<&str> {
        match self.chunks.as_slice() {
            [only] => only.source().strip_prefix(FALLBACK_SOURCE_PREFIX),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_reads_as_unknown() {
        let mut chunk = Chunk::new("text", "knowledge_base", 0.5);
        chunk.metadata.remove(SOURCE_KEY);
        assert_eq!(chunk.source(), UNKNOWN_SOURCE);
    }

    #[test]
    fn fallback_reason_needs_a_single_tagged_chunk() {
        let fallback = RetrievalResult::from_chunks(vec![Chunk::new("a", "fallback:graph-empty", 0.0)]);
        assert_eq!(fallback.fallback_reason(), Some("graph-empty"));

        let evidence = RetrievalResult::from_chunks(vec![Chunk::new("a", "search_index", 0.7)]);
        assert!(!evidence.is_fallback());
        assert!(!RetrievalResult::empty().is_fallback());
    }

    #[test]
    fn untagged_metadata_round_trips_through_json() {
        let chunk = Chunk::new("fused", "knowledge_base+search_index", 0.6)
            .with_metadata(SYNTHESIZED_KEY, true)
            .with_metadata(CHUNKS_USED_KEY, 2usize);
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["metadata"]["chunks_used"], 2.0);
        assert_eq!(json["metadata"]["synthesized"], true);

        let back: Chunk = serde_json::from_value(json).unwrap();
        assert!(back.is_synthesized());
        assert_eq!(back.chunks_used(), Some(2));
    }
}

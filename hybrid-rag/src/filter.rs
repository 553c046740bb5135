//! Post-retrieval metadata filtering.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, MetadataValue};

/// A conjunction of exact-match metadata predicates.
///
/// A chunk passes iff every key in the filter is present in its metadata
/// with an equal value. An empty filter passes everything.
///
/// # Example
///
/// ```rust,ignore
/// let filter = MetadataFilter::new().with("source", "search_index");
/// let kept = filter.apply(chunks);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(HashMap<String, MetadataValue>);

impl MetadataFilter {
    /// An empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to equal `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether the filter has no predicates.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `chunk` satisfies every predicate.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.0.iter().all(|(key, expected)| chunk.metadata.get(key) == Some(expected))
    }

    /// Keep only matching chunks, preserving order.
    pub fn apply(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        if self.is_empty() {
            return chunks;
        }
        chunks.into_iter().filter(|chunk| self.matches(chunk)).collect()
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for MetadataFilter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Apply an optional filter. `None` is the identity.
pub fn filter_by_metadata(chunks: Vec<Chunk>, filter: Option<&MetadataFilter>) -> Vec<Chunk> {
    match filter {
        Some(filter) => filter.apply(chunks),
        None => chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::CHUNKS_USED_KEY;

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("a", "knowledge_base", 0.8).with_metadata("title", "S3"),
            Chunk::new("b", "search_index", 0.4).with_metadata("page", 3.0),
            Chunk::new("c", "search_index", 0.2).with_metadata("page", "3"),
        ]
    }

    #[test]
    fn absent_or_empty_filter_is_identity() {
        assert_eq!(filter_by_metadata(chunks(), None), chunks());
        assert_eq!(MetadataFilter::new().apply(chunks()), chunks());
    }

    #[test]
    fn every_key_must_match_exactly() {
        let filter = MetadataFilter::new().with("source", "search_index").with("page", 3.0);
        let kept = filter.apply(chunks());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].content, "b");
    }

    #[test]
    fn missing_key_fails_the_predicate() {
        let filter: MetadataFilter = [("title", "S3")].into_iter().collect();
        let kept = filter.apply(chunks());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].content, "a");
    }

    #[test]
    fn chunks_used_matches_numbers_not_text() {
        let fused = vec![Chunk::new("ctx", "knowledge_base+search_index", 0.6)
            .with_metadata(CHUNKS_USED_KEY, 2usize)];

        assert_eq!(MetadataFilter::new().with(CHUNKS_USED_KEY, 2usize).apply(fused.clone()).len(), 1);
        assert_eq!(MetadataFilter::new().with(CHUNKS_USED_KEY, 2.0).apply(fused.clone()).len(), 1);
        assert!(MetadataFilter::new().with(CHUNKS_USED_KEY, "2").apply(fused.clone()).is_empty());

        let from_json: MetadataFilter = serde_json::from_str(r#"{"chunks_used": 2}"#).unwrap();
        assert_eq!(from_json.apply(fused).len(), 1);
    }
}

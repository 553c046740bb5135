//! Source deduplication over score-ordered chunks.

use std::collections::HashSet;

use crate::chunk::Chunk;

/// Keep the first chunk seen for each distinct source label.
///
/// The walk is greedy and order-dependent: given input sorted by descending
/// score, the highest-scoring chunk per source wins. Output order follows
/// input order.
pub fn dedup_by_source(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks.into_iter().filter(|chunk| seen.insert(chunk.source().to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_chunk_per_source() {
        let chunks = vec![
            Chunk::new("kb-best", "knowledge_base", 0.9),
            Chunk::new("si-best", "search_index", 0.7),
            Chunk::new("kb-second", "knowledge_base", 0.6),
        ];
        let kept = dedup_by_source(chunks);
        let contents: Vec<&str> = kept.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, ["kb-best", "si-best"]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(dedup_by_source(Vec::new()).is_empty());
    }
}

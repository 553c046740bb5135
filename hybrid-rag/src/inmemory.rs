//! In-memory knowledge backends.
//!
//! [`InMemoryKnowledgeBase`] embeds passages on insert and searches by cosine
//! similarity. [`InMemorySearchIndex`] scores passages by query-term overlap.
//! Both are backed by a `tokio::sync::RwLock` and suit development, tests and
//! small corpora.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{RawHit, SearchBackend};
use crate::chunk::Metadata;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::reranker::cosine_similarity;

#[derive(Debug, Clone)]
struct StoredPassage {
    hit: RawHit,
    embedding: Vec<f32>,
}

/// A vector-search knowledge base held in memory.
///
/// Embedding happens before the lock is taken, so no lock is held across
/// a provider call.
///
/// # Example
///
/// ```rust,ignore
/// let kb = InMemoryKnowledgeBase::new(Arc::new(HashEmbeddingProvider::default()));
/// kb.insert("S3 stores objects in buckets.", Metadata::new()).await?;
/// let hits = kb.search("What is S3?", 3).await?;
/// ```
pub struct InMemoryKnowledgeBase {
    embedder: Arc<dyn EmbeddingProvider>,
    passages: RwLock<Vec<StoredPassage>>,
}

impl InMemoryKnowledgeBase {
    /// Create an empty knowledge base using `embedder` for passages and queries.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder, passages: RwLock::new(Vec::new()) }
    }

    /// Embed and store a passage.
    pub async fn insert(&self, content: impl Into<String>, metadata: Metadata) -> Result<()> {
        let content = content.into();
        let embedding = self.embedder.embed(&content).await?;
        let hit = RawHit { content, metadata, score: None };
        self.passages.write().await.push(StoredPassage { hit, embedding });
        Ok(())
    }

    /// Number of stored passages.
    pub async fn len(&self) -> usize {
        self.passages.read().await.len()
    }

    /// Whether the knowledge base is empty.
    pub async fn is_empty(&self) -> bool {
        self.passages.read().await.is_empty()
    }
}

#[async_trait]
impl SearchBackend for InMemoryKnowledgeBase {
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<RawHit>> {
        let query = self.embedder.embed(text).await?;
        let passages = self.passages.read().await;

        let mut scored: Vec<(f32, &RawHit)> = passages
            .iter()
            .map(|p| (cosine_similarity(&p.embedding, &query), &p.hit))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, hit)| RawHit { score: Some(score), ..hit.clone() })
            .collect())
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A lexical search index held in memory.
///
/// Relevance is the fraction of distinct query terms that appear in a
/// passage. Passages sharing no term with the query are not returned.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    passages: RwLock<Vec<(RawHit, HashSet<String>)>>,
}

impl InMemorySearchIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a passage.
    pub async fn insert(&self, content: impl Into<String>, metadata: Metadata) {
        let content = content.into();
        let indexed = terms(&content);
        let hit = RawHit { content, metadata, score: None };
        self.passages.write().await.push((hit, indexed));
    }

    /// Number of indexed passages.
    pub async fn len(&self) -> usize {
        self.passages.read().await.len()
    }

    /// Whether the index is empty.
    pub async fn is_empty(&self) -> bool {
        self.passages.read().await.is_empty()
    }
}

#[async_trait]
impl SearchBackend for InMemorySearchIndex {
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<RawHit>> {
        let query_terms = terms(text);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let passages = self.passages.read().await;
        let mut scored: Vec<(f32, &RawHit)> = passages
            .iter()
            .filter_map(|(hit, indexed)| {
                let overlap = query_terms.intersection(indexed).count();
                (overlap > 0).then(|| (overlap as f32 / query_terms.len() as f32, hit))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, hit)| RawHit { score: Some(score), ..hit.clone() })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;

    #[tokio::test]
    async fn knowledge_base_returns_closest_passage_first() {
        let kb = InMemoryKnowledgeBase::new(Arc::new(HashEmbeddingProvider::new(128)));
        kb.insert("VPC peering connects two virtual networks", Metadata::new()).await.unwrap();
        kb.insert("S3 buckets store objects", Metadata::new()).await.unwrap();
        assert_eq!(kb.len().await, 2);

        let hits = kb.search("S3 buckets", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "S3 buckets store objects");
    }

    #[tokio::test]
    async fn search_index_scores_by_term_overlap() {
        let index = InMemorySearchIndex::new();
        index.insert("IAM roles grant temporary credentials", Metadata::new()).await;
        index.insert("IAM users have long-lived keys", Metadata::new()).await;
        index.insert("Lambda runs functions", Metadata::new()).await;

        let hits = index.search("IAM roles", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "IAM roles grant temporary credentials");
        assert_eq!(hits[0].score, Some(1.0));
        assert_eq!(hits[1].score, Some(0.5));
    }
}

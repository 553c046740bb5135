//! Similarity scoring and reranking.
//!
//! [`SimilarityRanker`] rescores chunks by cosine similarity between the
//! query embedding and each chunk embedding. It is the only place chunk
//! scores become comparable across backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::config::RagConfig;
use crate::embedding::{EmbeddingEngine, EmbeddingEngines, embed_with_timeout};
use crate::error::{RagError, Result};
use crate::query::Query;

/// A reranker that re-scores and reorders chunks against a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank `chunks` for `query`, returning them in descending score order.
    async fn rerank(&self, query: &Query, chunks: Vec<Chunk>) -> Result<Vec<Chunk>>;

    /// The embedding engine this reranker tries first, if it uses one.
    fn engine(&self) -> Option<EmbeddingEngine> {
        None
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude, if the lengths differ,
/// or if the result would not be finite. Never returns NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = dot / (norm_a * norm_b);
    if score.is_finite() { score } else { 0.0 }
}

/// Sort chunks by descending score. Ties keep their input order.
pub fn sort_by_score_desc(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Reranks chunks by embedding cosine similarity.
///
/// The configured engine is tried first. If any embedding call on it fails
/// or times out, the whole rank is redone on the alternate engine and the
/// substitution is logged; [`rank`](Self::rank) only fails with
/// [`RagError::Ranking`] when both engines fail. Vectors from different
/// engines are never compared with each other.
#[derive(Debug, Clone)]
pub struct SimilarityRanker {
    engines: EmbeddingEngines,
    preferred: EmbeddingEngine,
    embed_timeout: Duration,
}

impl SimilarityRanker {
    /// Create a ranker that prefers `preferred` and bounds each embedding
    /// call by `embed_timeout`.
    pub fn new(engines: EmbeddingEngines, preferred: EmbeddingEngine, embed_timeout: Duration) -> Self {
        Self { engines, preferred, embed_timeout }
    }

    /// A ranker over `engines` using the config's engine and embedding timeout.
    pub fn from_config(engines: EmbeddingEngines, config: &RagConfig) -> Self {
        Self::new(engines, config.embedding_engine, config.embedding_timeout())
    }

    /// The engine tried first.
    pub fn preferred_engine(&self) -> EmbeddingEngine {
        self.preferred
    }

    /// Score and sort `chunks` against `query`.
    ///
    /// Embeds the query once and every chunk once, sequentially, then sorts
    /// by descending score with ties kept in input order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Ranking`] only if both engines fail.
    pub async fn rank(&self, query: &Query, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        if chunks.is_empty() {
            return Ok(chunks);
        }

        let primary = self.preferred;
        let primary_err = match self.scores_with(primary, query, &chunks).await {
            Ok(scores) => return Ok(apply_scores(chunks, scores)),
            Err(e) => e,
        };

        let fallback = primary.alternate();
        warn!(
            engine = %primary,
            fallback_engine = %fallback,
            error = %primary_err,
            "embedding engine failed, reranking with alternate engine"
        );

        match self.scores_with(fallback, query, &chunks).await {
            Ok(scores) => Ok(apply_scores(chunks, scores)),
            Err(fallback_err) => Err(RagError::Ranking {
                message: format!(
                    "engine {primary} failed: {primary_err}; engine {fallback} failed: {fallback_err}"
                ),
            }),
        }
    }

    async fn scores_with(
        &self,
        engine: EmbeddingEngine,
        query: &Query,
        chunks: &[Chunk],
    ) -> Result<Vec<f32>> {
        let provider = self.engines.get(engine).as_ref();
        debug!(engine = %engine, provider = provider.name(), chunk_count = chunks.len(), "ranking");

        let query_vec = embed_with_timeout(provider, query.text(), self.embed_timeout).await?;
        let mut scores = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let chunk_vec = embed_with_timeout(provider, &chunk.content, self.embed_timeout).await?;
            scores.push(cosine_similarity(&query_vec, &chunk_vec));
        }
        Ok(scores)
    }
}

fn apply_scores(mut chunks: Vec<Chunk>, scores: Vec<f32>) -> Vec<Chunk> {
    for (chunk, score) in chunks.iter_mut().zip(scores) {
        chunk.score = score;
    }
    sort_by_score_desc(&mut chunks);
    chunks
}

#[async_trait]
impl Reranker for SimilarityRanker {
    async fn rerank(&self, query: &Query, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        self.rank(query, chunks).await
    }

    fn engine(&self) -> Option<EmbeddingEngine> {
        Some(self.preferred)
    }
}

/// Pick the explicit reranker or build one from `engines`, and reject a
/// reranker whose preferred engine disagrees with the config.
pub(crate) fn resolve_reranker(
    reranker: Option<Arc<dyn Reranker>>,
    engines: Option<EmbeddingEngines>,
    config: &RagConfig,
) -> Result<Arc<dyn Reranker>> {
    let reranker: Arc<dyn Reranker> = match (reranker, engines) {
        (Some(reranker), _) => reranker,
        (None, Some(engines)) => Arc::new(SimilarityRanker::from_config(engines, config)),
        (None, None) => {
            return Err(RagError::Config(
                "reranker or embedding engines are required".to_string(),
            ));
        }
    };
    if let Some(engine) = reranker.engine().filter(|e| *e != config.embedding_engine) {
        return Err(RagError::Config(format!(
            "reranker prefers engine {engine} but config selects engine {}",
            config.embedding_engine
        )));
    }
    Ok(reranker)
}

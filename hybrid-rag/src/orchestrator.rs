//! Single-backend retrieval orchestrator.
//!
//! The [`Retriever`] queries the configured backend, applies an optional
//! metadata filter, reranks, drops chunks under the score threshold and
//! truncates to `top_k`.
//!
//! # Example
//!
//! ```rust,ignore
//! use hybrid_rag::{Retriever, RagConfig, BackendAdapter};
//!
//! let retriever = Retriever::builder()
//!     .config(RagConfig::default())
//!     .adapter(Arc::new(BackendAdapter::knowledge_base(kb, timeout)))
//!     .reranker(Arc::new(ranker))
//!     .build()?;
//!
//! let chunks = retriever.retrieve("How does VPC peering work?", 5, None).await?;
//! ```

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::backend::{BackendAdapter, BackendKind, QueryAdapter, SearchBackend};
use crate::chunk::Chunk;
use crate::config::RagConfig;
use crate::embedding::EmbeddingEngines;
use crate::error::{RagError, Result};
use crate::filter::{MetadataFilter, filter_by_metadata};
use crate::query::Query;
use crate::reranker::{Reranker, resolve_reranker};

/// Retrieves, filters and reranks chunks from a single backend.
///
/// Construct one via [`Retriever::builder()`].
pub struct Retriever {
    config: RagConfig,
    adapters: Vec<Arc<dyn QueryAdapter>>,
    reranker: Arc<dyn Reranker>,
}

impl Retriever {
    /// Create a new [`RetrieverBuilder`].
    pub fn builder() -> RetrieverBuilder {
        RetrieverBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    fn selected_adapter(&self) -> Option<&Arc<dyn QueryAdapter>> {
        let kind = self.config.backend?;
        self.adapters.iter().find(|a| a.kind() == kind)
    }

    /// Query the configured backend: fetch → filter → rerank → threshold → top-k.
    ///
    /// An unconfigured or unreachable backend yields an empty result, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Ranking`] if reranking fails on both embedding engines.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Chunk>> {
        let query = Query::new(query);
        let top_k = if top_k == 0 {
            warn!("top_k of 0 requested, using 1");
            1
        } else {
            top_k
        };
        let Some(adapter) = self.selected_adapter() else {
            info!(backend = ?self.config.backend, "no retrieval backend available");
            return Ok(Vec::new());
        };

        // 1. Fetch from the selected backend
        let chunks = adapter.query(&query, top_k).await;

        // 2. Filter by metadata
        let chunks = filter_by_metadata(chunks, filter);
        if chunks.is_empty() {
            info!(backend = %adapter.kind(), "no chunks to rank");
            return Ok(chunks);
        }

        // 3. Rerank
        let ranked = self.reranker.rerank(&query, chunks).await.map_err(|e| {
            error!(error = %e, "reranking failed");
            e
        })?;

        // 4. Threshold, then truncate
        let threshold = self.config.score_threshold;
        let mut kept: Vec<Chunk> = ranked.into_iter().filter(|c| c.score >= threshold).collect();
        kept.truncate(top_k);

        info!(backend = %adapter.kind(), result_count = kept.len(), "retrieval completed");
        Ok(kept)
    }
}

/// Builder for constructing a [`Retriever`].
///
/// `config` is required, plus either a `reranker` or the `engines` to build
/// one from the config. Adapters may be omitted, in which case every
/// retrieval returns an empty result.
#[derive(Default)]
pub struct RetrieverBuilder {
    config: Option<RagConfig>,
    adapters: Vec<Arc<dyn QueryAdapter>>,
    backends: Vec<(BackendKind, Arc<dyn SearchBackend>)>,
    reranker: Option<Arc<dyn Reranker>>,
    engines: Option<EmbeddingEngines>,
}

impl RetrieverBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register a backend adapter. The configured backend kind picks which
    /// adapter is used.
    pub fn adapter(mut self, adapter: Arc<dyn QueryAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Register a raw backend of `kind`, wrapped at build time with the
    /// config's backend timeout.
    pub fn backend(mut self, kind: BackendKind, backend: Arc<dyn SearchBackend>) -> Self {
        self.backends.push((kind, backend));
        self
    }

    /// Set the reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the embedding engines; without an explicit reranker, a
    /// [`SimilarityRanker`](crate::SimilarityRanker) is built from them and
    /// the config.
    pub fn engines(mut self, engines: EmbeddingEngines) -> Self {
        self.engines = Some(engines);
        self
    }

    /// Build the [`Retriever`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing, the
    /// config is invalid, or the reranker prefers a different embedding
    /// engine than the config selects.
    pub fn build(self) -> Result<Retriever> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        config.validate()?;
        let reranker = resolve_reranker(self.reranker, self.engines, &config)?;

        let mut adapters = self.adapters;
        for (kind, backend) in self.backends {
            adapters.push(Arc::new(BackendAdapter::from_config(kind, backend, &config)));
        }
        Ok(Retriever { config, adapters, reranker })
    }
}

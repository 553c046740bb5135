//! Hybrid multi-backend router.
//!
//! [`HybridRouter::route`] runs the full pipeline for one query:
//!
//! ```text
//! RETRIEVING → RERANKING → FILTERING → DEDUPING → SYNTHESIZING → DONE
//!      └────────────┴───────────┴───────────┴────────────┴──→ FALLBACK → DONE
//! ```
//!
//! Any stage that starves or fails diverts to the generation fallback,
//! tagged with the reason. No state survives between calls.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::alert::TtlCache;
use crate::backend::{BackendAdapter, BackendKind, QueryAdapter, SearchBackend};
use crate::chunk::{
    CHUNKS_USED_KEY, Chunk, FALLBACK_SOURCE_PREFIX, RetrievalResult, SYNTHESIZED_KEY,
};
use crate::config::RagConfig;
use crate::dedup::dedup_by_source;
use crate::embedding::EmbeddingEngines;
use crate::error::{RagError, Result};
use crate::filter::{MetadataFilter, filter_by_metadata};
use crate::generation::TextGenerator;
use crate::query::Query;
use crate::reranker::{Reranker, resolve_reranker};
use crate::synthesis::ChunkSynthesizer;

/// Answer returned by [`HybridRouter::answer`] when even the fallback fails.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I couldn't put together a reliable answer right now. Please try again in a moment.";

/// Reason tag used by [`HybridRouter::answer`] when the fallback is exhausted.
pub const EXHAUSTED_REASON: &str = "exhausted";

/// Maximum number of distinct reasons tracked by the fallback alert cache.
const ALERT_CACHE_CAPACITY: u64 = 64;

/// A state of the per-query routing state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteStage {
    /// Fanning out to the backends.
    Retrieving,
    /// Rescoring the combined pool.
    Reranking,
    /// Applying the confidence threshold.
    Filtering,
    /// Keeping the best chunk per source.
    Deduping,
    /// Fusing the survivors into one context.
    Synthesizing,
    /// Answering directly with the generator.
    Fallback,
    /// Finished.
    Done,
}

impl fmt::Display for RouteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Retrieving => "RETRIEVING",
            Self::Reranking => "RERANKING",
            Self::Filtering => "FILTERING",
            Self::Deduping => "DEDUPING",
            Self::Synthesizing => "SYNTHESIZING",
            Self::Fallback => "FALLBACK",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Why the router fell back to generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FallbackReason {
    /// Both backends returned nothing.
    EmptyRetrieval,
    /// The reranker returned nothing.
    EmptyRerank,
    /// No reranked chunk met the confidence threshold.
    ScoreBelowThreshold,
    /// Source deduplication left nothing.
    GraphEmpty,
    /// Both embedding engines failed while reranking.
    RankingError,
    /// The synthesizer failed.
    SynthesisError,
}

impl FallbackReason {
    /// The tag used in `fallback:<reason>` source labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyRetrieval => "empty-retrieval",
            Self::EmptyRerank => "empty-rerank",
            Self::ScoreBelowThreshold => "score-below-threshold",
            Self::GraphEmpty => "graph-empty",
            Self::RankingError => "ranking-error",
            Self::SynthesisError => "synthesis-error",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct StageFailure {
    stage: RouteStage,
    reason: FallbackReason,
    detail: Option<String>,
}

impl StageFailure {
    fn new(stage: RouteStage, reason: FallbackReason) -> Self {
        Self { stage, reason, detail: None }
    }

    fn with_detail(mut self, detail: impl fmt::Display) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}

/// The top-level entry point: fan-out, rerank, filter, dedup, synthesize,
/// or fall back.
///
/// Both backend calls run concurrently inside the caller's task, each bounded
/// by its adapter's timeout. Dropping the future returned by
/// [`route`](Self::route) cancels both backend calls and any pending
/// embedding call.
pub struct HybridRouter {
    config: RagConfig,
    knowledge_base: Option<Arc<dyn QueryAdapter>>,
    search_index: Option<Arc<dyn QueryAdapter>>,
    reranker: Arc<dyn Reranker>,
    synthesizer: Arc<dyn ChunkSynthesizer>,
    generator: Option<Arc<dyn TextGenerator>>,
    alerts: Arc<TtlCache<FallbackReason>>,
}

impl HybridRouter {
    /// Create a new [`HybridRouterBuilder`].
    pub fn builder() -> HybridRouterBuilder {
        HybridRouterBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Route `query`, requesting and keeping up to `top_k` chunks. A `top_k`
    /// of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::FallbackExhausted`] only when a stage failed and
    /// the generation fallback failed too. With fallback disabled this never
    /// fails; starved stages yield an empty result instead.
    pub async fn route(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        self.route_filtered(query, top_k, None).await
    }

    /// Like [`route`](Self::route), with a metadata filter applied to the
    /// combined pool before reranking.
    #[instrument(skip_all, fields(top_k = top_k))]
    pub async fn route_filtered(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<RetrievalResult> {
        let query = Query::new(query);
        info!(query = %query, "hybrid retrieval triggered");
        let top_k = if top_k == 0 {
            warn!("top_k of 0 requested, using 1");
            1
        } else {
            top_k
        };

        match self.run_stages(&query, top_k, filter).await {
            Ok(context) => {
                info!(
                    stage = %RouteStage::Done,
                    source = context.source(),
                    score = context.score,
                    "routing completed"
                );
                Ok(RetrievalResult::from_chunks(vec![context]))
            }
            Err(failure) => self.fall_back(&query, failure).await,
        }
    }

    /// Route with the configured `top_k` and turn an exhausted fallback into
    /// an apologetic answer instead of an error.
    pub async fn answer(&self, query: &str) -> RetrievalResult {
        match self.route(query, self.config.top_k).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "all answer paths failed");
                let apology = Chunk::new(
                    APOLOGY_MESSAGE,
                    format!("{FALLBACK_SOURCE_PREFIX}{EXHAUSTED_REASON}"),
                    0.0,
                )
                .with_metadata(SYNTHESIZED_KEY, false);
                RetrievalResult::from_chunks(vec![apology])
            }
        }
    }

    async fn fan_out(&self, query: &Query, top_k: usize) -> Vec<Chunk> {
        async fn query_one(
            adapter: Option<&Arc<dyn QueryAdapter>>,
            query: &Query,
            top_k: usize,
        ) -> Vec<Chunk> {
            match adapter {
                Some(adapter) => adapter.query(query, top_k).await,
                None => Vec::new(),
            }
        }

        let (mut combined, search_index) = tokio::join!(
            query_one(self.knowledge_base.as_ref(), query, top_k),
            query_one(self.search_index.as_ref(), query, top_k),
        );
        combined.extend(search_index);
        combined
    }

    async fn run_stages(
        &self,
        query: &Query,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Chunk, StageFailure> {
        // 1. Fan out to both backends
        debug!(stage = %RouteStage::Retrieving, "entering stage");
        let combined = filter_by_metadata(self.fan_out(query, top_k).await, filter);
        if combined.is_empty() {
            return Err(StageFailure::new(RouteStage::Retrieving, FallbackReason::EmptyRetrieval));
        }
        let pool_size = combined.len();

        // 2. Rerank the combined pool; backend-native scores are discarded here
        debug!(stage = %RouteStage::Reranking, pool_size, "entering stage");
        let mut ranked = self.reranker.rerank(query, combined).await.map_err(|e| {
            StageFailure::new(RouteStage::Reranking, FallbackReason::RankingError).with_detail(e)
        })?;
        if ranked.is_empty() {
            return Err(StageFailure::new(RouteStage::Reranking, FallbackReason::EmptyRerank));
        }
        ranked.truncate(top_k);

        // 3. Confidence filter
        let threshold = self.config.router_score_threshold;
        debug!(stage = %RouteStage::Filtering, threshold, "entering stage");
        let confident: Vec<Chunk> = ranked.into_iter().filter(|c| c.score >= threshold).collect();
        if confident.is_empty() {
            return Err(StageFailure::new(
                RouteStage::Filtering,
                FallbackReason::ScoreBelowThreshold,
            ));
        }

        // 4. One chunk per source
        debug!(stage = %RouteStage::Deduping, candidates = confident.len(), "entering stage");
        let graph = dedup_by_source(confident);
        if graph.is_empty() {
            return Err(StageFailure::new(RouteStage::Deduping, FallbackReason::GraphEmpty));
        }
        for chunk in &graph {
            let snippet: String = chunk.content.chars().take(60).collect();
            debug!(source = chunk.source(), score = chunk.score, snippet = %snippet, "selected chunk");
        }

        // 5. Fuse
        debug!(stage = %RouteStage::Synthesizing, chunks = graph.len(), "entering stage");
        let context = self.synthesizer.synthesize(&graph).await.map_err(|e| {
            StageFailure::new(RouteStage::Synthesizing, FallbackReason::SynthesisError)
                .with_detail(e)
        })?;
        if context.trim().is_empty() {
            return Err(StageFailure::new(
                RouteStage::Synthesizing,
                FallbackReason::SynthesisError,
            )
            .with_detail("synthesizer returned empty context"));
        }

        let sources: Vec<&str> = graph.iter().map(Chunk::source).collect();
        let min_score = graph.iter().map(|c| c.score).fold(f32::INFINITY, f32::min);

        Ok(Chunk::new(context, sources.join("+"), min_score)
            .with_metadata(SYNTHESIZED_KEY, true)
            .with_metadata(CHUNKS_USED_KEY, graph.len()))
    }

    async fn fall_back(&self, query: &Query, failure: StageFailure) -> Result<RetrievalResult> {
        let StageFailure { stage, reason, detail } = failure;
        let detail = detail.unwrap_or_default();
        if self.alerts.check_and_insert(reason) {
            warn!(%stage, %reason, detail = %detail, "retrieval failed, switching to fallback");
        } else {
            debug!(%stage, %reason, detail = %detail, "retrieval failed, switching to fallback (repeat)");
        }

        if !self.config.fallback_enabled {
            info!(%reason, "fallback disabled, returning empty result");
            return Ok(RetrievalResult::empty());
        }
        debug!(stage = %RouteStage::Fallback, %reason, "entering stage");

        let exhausted = |message: String| RagError::FallbackExhausted {
            reason: reason.to_string(),
            message,
        };
        let Some(generator) = &self.generator else {
            return Err(exhausted("no generator configured".to_string()));
        };

        let answer = generator.generate(query.raw()).await.map_err(|e| {
            error!(%reason, error = %e, "generation fallback failed");
            exhausted(e.to_string())
        })?;
        if answer.trim().is_empty() {
            error!(%reason, "generation fallback returned an empty answer");
            return Err(exhausted("generator returned an empty answer".to_string()));
        }

        info!(stage = %RouteStage::Done, %reason, "answered by generation fallback");
        let chunk = Chunk::new(answer, format!("{FALLBACK_SOURCE_PREFIX}{reason}"), 0.0)
            .with_metadata(SYNTHESIZED_KEY, false);
        Ok(RetrievalResult::from_chunks(vec![chunk]))
    }
}

/// Builder for constructing a [`HybridRouter`].
///
/// `config` and `synthesizer` are required, plus either a `reranker` or the
/// `engines` to build one from the config. A `generator` is required
/// whenever the config enables fallback. Either backend may be omitted; a
/// missing backend contributes no chunks.
///
/// Backends passed through [`knowledge_base_backend`](Self::knowledge_base_backend)
/// and [`search_index_backend`](Self::search_index_backend) are wrapped with
/// the config's backend timeout. A ranker built from `engines` uses the
/// config's engine and embedding timeout. A supplied reranker that prefers a
/// different engine than the config is rejected.
///
/// # Example
///
/// ```rust,ignore
/// let router = HybridRouter::builder()
///     .config(config)
///     .knowledge_base_backend(kb)
///     .search_index_backend(index)
///     .engines(EmbeddingEngines::new(primary, secondary))
///     .synthesizer(Arc::new(ConcatSynthesizer::new()))
///     .generator(Arc::new(chat))
///     .build()?;
/// ```
#[derive(Default)]
pub struct HybridRouterBuilder {
    config: Option<RagConfig>,
    knowledge_base: Option<Arc<dyn QueryAdapter>>,
    search_index: Option<Arc<dyn QueryAdapter>>,
    knowledge_base_backend: Option<Arc<dyn SearchBackend>>,
    search_index_backend: Option<Arc<dyn SearchBackend>>,
    reranker: Option<Arc<dyn Reranker>>,
    engines: Option<EmbeddingEngines>,
    synthesizer: Option<Arc<dyn ChunkSynthesizer>>,
    generator: Option<Arc<dyn TextGenerator>>,
    alerts: Option<Arc<TtlCache<FallbackReason>>>,
}

impl HybridRouterBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the knowledge-base adapter.
    pub fn knowledge_base(mut self, adapter: Arc<dyn QueryAdapter>) -> Self {
        self.knowledge_base = Some(adapter);
        self
    }

    /// Set the search-index adapter.
    pub fn search_index(mut self, adapter: Arc<dyn QueryAdapter>) -> Self {
        self.search_index = Some(adapter);
        self
    }

    /// Set the raw knowledge-base backend, wrapped at build time with the
    /// config's backend timeout. Ignored if an adapter is also set.
    pub fn knowledge_base_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.knowledge_base_backend = Some(backend);
        self
    }

    /// Set the raw search-index backend, wrapped at build time with the
    /// config's backend timeout. Ignored if an adapter is also set.
    pub fn search_index_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.search_index_backend = Some(backend);
        self
    }

    /// Set the reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the embedding engines; without an explicit reranker, a
    /// [`SimilarityRanker`] is built from them and the config.
    pub fn engines(mut self, engines: EmbeddingEngines) -> Self {
        self.engines = Some(engines);
        self
    }

    /// Set the chunk synthesizer.
    pub fn synthesizer(mut self, synthesizer: Arc<dyn ChunkSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Set the generator used for fallback answers.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Share a fallback alert cache, e.g. across rebuilt routers. By default
    /// each router gets its own cache sized from the config.
    pub fn alert_cache(mut self, alerts: Arc<TtlCache<FallbackReason>>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Build the [`HybridRouter`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing, the
    /// config is invalid, or the reranker prefers a different embedding
    /// engine than the config selects.
    pub fn build(self) -> Result<HybridRouter> {
        let config =
            self.config.ok_or_else(|| RagError::Config("config is required".to_string()))?;
        config.validate()?;
        let reranker = resolve_reranker(self.reranker, self.engines, &config)?;
        let synthesizer = self
            .synthesizer
            .ok_or_else(|| RagError::Config("synthesizer is required".to_string()))?;
        if config.fallback_enabled && self.generator.is_none() {
            return Err(RagError::Config(
                "generator is required when fallback is enabled".to_string(),
            ));
        }
        let alerts = self.alerts.unwrap_or_else(|| {
            Arc::new(TtlCache::new(config.fallback_alert_ttl(), ALERT_CACHE_CAPACITY))
        });

        let knowledge_base = self.knowledge_base.or_else(|| {
            self.knowledge_base_backend.map(|backend| {
                Arc::new(BackendAdapter::from_config(BackendKind::KnowledgeBase, backend, &config))
                    as Arc<dyn QueryAdapter>
            })
        });
        let search_index = self.search_index.or_else(|| {
            self.search_index_backend.map(|backend| {
                Arc::new(BackendAdapter::from_config(BackendKind::SearchIndex, backend, &config))
                    as Arc<dyn QueryAdapter>
            })
        });

        Ok(HybridRouter {
            config,
            knowledge_base,
            search_index,
            reranker,
            synthesizer,
            generator: self.generator,
            alerts,
        })
    }
}

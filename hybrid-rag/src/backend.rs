//! Knowledge backends and the adapters that normalize their results.
//!
//! A [`SearchBackend`] is the raw, fallible retrieval call against one
//! knowledge source. A [`BackendAdapter`] wraps it, bounds it with a timeout
//! and turns its [`RawHit`]s into [`Chunk`]s. Adapters never return errors:
//! faults and timeouts are logged and become an empty result.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunk::{Chunk, Metadata, MetadataValue, ORIGIN_KEY, SOURCE_KEY};
use crate::config::RagConfig;
use crate::error::Result;
use crate::query::{Query, clean_text};

/// Score given to knowledge-base hits, which arrive unranked.
pub const UNRANKED_SCORE: f32 = 0.8;

/// The closed set of knowledge backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A managed vector-search knowledge base.
    KnowledgeBase,
    /// An independently administered search index.
    SearchIndex,
}

impl BackendKind {
    /// The `source` label stamped onto chunks from this backend.
    pub fn source_label(self) -> &'static str {
        match self {
            Self::KnowledgeBase => "knowledge_base",
            Self::SearchIndex => "search_index",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_label())
    }
}

/// A backend-native search hit before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    /// The passage text.
    pub content: String,
    /// Backend metadata; any subset of fields may be missing.
    #[serde(default)]
    pub metadata: Metadata,
    /// Backend-native relevance score, if the backend produces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl RawHit {
    /// A hit with no metadata and no score.
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Self::default() }
    }

    /// Attach a native score.
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A one-shot retrieval call against a knowledge source.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Return up to `top_k` hits for `text`.
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<RawHit>>;
}

/// Translates a query into a backend call and normalizes the results.
///
/// Implementations must not fail: any backend fault yields an empty result.
#[async_trait]
pub trait QueryAdapter: Send + Sync {
    /// Which backend this adapter queries.
    fn kind(&self) -> BackendKind;

    /// Query the backend for up to `top_k` chunks.
    async fn query(&self, query: &Query, top_k: usize) -> Vec<Chunk>;
}

/// The standard [`QueryAdapter`] over a [`SearchBackend`].
///
/// Knowledge-base hits get [`UNRANKED_SCORE`]; search-index hits keep their
/// native score, or 0.0 when the backend supplies none.
pub struct BackendAdapter {
    kind: BackendKind,
    backend: Arc<dyn SearchBackend>,
    timeout: Duration,
}

impl BackendAdapter {
    /// Create an adapter for `backend` of the given kind.
    pub fn new(kind: BackendKind, backend: Arc<dyn SearchBackend>, timeout: Duration) -> Self {
        Self { kind, backend, timeout }
    }

    /// An adapter of the given kind bounded by the config's backend timeout.
    pub fn from_config(kind: BackendKind, backend: Arc<dyn SearchBackend>, config: &RagConfig) -> Self {
        Self::new(kind, backend, config.backend_timeout())
    }

    /// An adapter for the managed vector-search knowledge base.
    pub fn knowledge_base(backend: Arc<dyn SearchBackend>, timeout: Duration) -> Self {
        Self::new(BackendKind::KnowledgeBase, backend, timeout)
    }

    /// An adapter for the search index.
    pub fn search_index(backend: Arc<dyn SearchBackend>, timeout: Duration) -> Self {
        Self::new(BackendKind::SearchIndex, backend, timeout)
    }

    fn normalize(&self, hit: RawHit) -> Option<Chunk> {
        let content = clean_text(&hit.content);
        if content.is_empty() {
            return None;
        }

        let label = self.kind.source_label();
        let mut metadata = hit.metadata;
        if let Some(previous) = metadata.remove(SOURCE_KEY) {
            if previous.as_str() != Some(label) {
                metadata.entry(ORIGIN_KEY.to_string()).or_insert(previous);
            }
        }
        metadata.insert(SOURCE_KEY.to_string(), MetadataValue::Text(label.to_string()));

        let score = match self.kind {
            BackendKind::KnowledgeBase => UNRANKED_SCORE,
            BackendKind::SearchIndex => hit.score.filter(|s| s.is_finite()).unwrap_or(0.0),
        };

        Some(Chunk { content, metadata, score })
    }
}

#[async_trait]
impl QueryAdapter for BackendAdapter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn query(&self, query: &Query, top_k: usize) -> Vec<Chunk> {
        let backend = self.kind;
        let hits = match tokio::time::timeout(self.timeout, self.backend.search(query.text(), top_k))
            .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(%backend, error = %e, "backend query failed");
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    %backend,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "backend query timed out"
                );
                return Vec::new();
            }
        };

        let raw_count = hits.len();
        let chunks: Vec<Chunk> = hits.into_iter().filter_map(|hit| self.normalize(hit)).collect();
        info!(%backend, raw_count, chunk_count = chunks.len(), "retrieved chunks");
        chunks
    }
}

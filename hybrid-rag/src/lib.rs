//! Hybrid retrieval-augmented answering.
//!
//! This crate retrieves supporting passages from two knowledge backends,
//! reranks them with a shared similarity measure, keeps the confident ones,
//! fuses one passage per source into a single context, and falls back to a
//! direct generated answer whenever retrieval yields nothing trustworthy.
//!
//! - [`HybridRouter`]: concurrent fan-out, rerank, confidence filter, source
//!   dedup, synthesis, and generation fallback
//! - [`Retriever`]: single-backend retrieve → filter → rerank → threshold
//! - [`SimilarityRanker`]: cosine reranking with automatic engine substitution
//! - [`BackendAdapter`]: fault-absorbing, timeout-bounded backend calls
//! - [`MetadataFilter`]: exact-match metadata predicates
//!
//! # Feature flags
//!
//! | Feature | Enables |
//! |---|---|
//! | `http` | [`remote::HttpKnowledgeBase`] and [`remote::OpenSearchIndex`] |
//! | `openai` | [`openai::OpenAIEmbeddingProvider`] and [`openai::OpenAIChatGenerator`] |
//! | `full` | everything above |

pub mod alert;
pub mod backend;
pub mod chunk;
pub mod config;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod generation;
pub mod inmemory;
pub mod orchestrator;
pub mod query;
pub mod reranker;
pub mod router;
pub mod synthesis;
pub mod telemetry;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "http")]
pub mod remote;

pub use alert::TtlCache;
pub use backend::{BackendAdapter, BackendKind, QueryAdapter, RawHit, SearchBackend, UNRANKED_SCORE};
pub use chunk::{Chunk, Metadata, MetadataValue, RetrievalResult};
pub use config::{RagConfig, RagConfigBuilder};
pub use dedup::dedup_by_source;
pub use embedding::{EmbeddingEngine, EmbeddingEngines, EmbeddingProvider, HashEmbeddingProvider};
pub use error::{RagError, Result};
pub use filter::{MetadataFilter, filter_by_metadata};
pub use generation::TextGenerator;
pub use inmemory::{InMemoryKnowledgeBase, InMemorySearchIndex};
pub use orchestrator::{Retriever, RetrieverBuilder};
pub use query::Query;
pub use reranker::{Reranker, SimilarityRanker, cosine_similarity};
pub use router::{FallbackReason, HybridRouter, HybridRouterBuilder, RouteStage};
pub use synthesis::{ChunkSynthesizer, ConcatSynthesizer, GenerativeSynthesizer};
pub use telemetry::{LogFormat, init_telemetry};

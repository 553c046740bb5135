//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hybrid_rag::{
    BackendAdapter, Chunk, ConcatSynthesizer, EmbeddingEngine, EmbeddingEngines,
    EmbeddingProvider, HybridRouter, Query, RagConfig, RagError, RawHit, Reranker, Result,
    SearchBackend, SimilarityRanker, TextGenerator,
};

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Embeds known passages so their cosine similarity to any query equals a
/// chosen score. Unknown text (the query) embeds to `[1, 0]`.
pub struct ScriptedEmbedder {
    scores: HashMap<String, f32>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new<'a>(scores: impl IntoIterator<Item = (&'a str, f32)>) -> Self {
        Self {
            scores: scores.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.scores.get(text) {
            Some(s) => vec![*s, (1.0 - s * s).max(0.0).sqrt()],
            None => vec![1.0, 0.0],
        })
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// An embedding provider that always fails.
pub struct DownEmbedder;

#[async_trait]
impl EmbeddingProvider for DownEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Embedding { provider: "down".into(), message: "quota exceeded".into() })
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// An embedding provider that never answers in time.
pub struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![1.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// A backend returning fixed hits, optionally after a delay.
pub struct FixedBackend {
    hits: Vec<RawHit>,
    delay: Option<Duration>,
}

impl FixedBackend {
    pub fn new(hits: Vec<RawHit>) -> Self {
        Self { hits, delay: None }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| RawHit::new(*t)).collect())
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SearchBackend for FixedBackend {
    async fn search(&self, _text: &str, top_k: usize) -> Result<Vec<RawHit>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.hits.iter().take(top_k).cloned().collect())
    }
}

/// A slow backend that counts searches finished and searches abandoned
/// mid-flight.
#[derive(Default)]
pub struct AbandonTracker {
    pub finished: Arc<AtomicUsize>,
    pub abandoned: Arc<AtomicUsize>,
}

struct InFlight {
    abandoned: Arc<AtomicUsize>,
    done: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.done {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl SearchBackend for AbandonTracker {
    async fn search(&self, _text: &str, _top_k: usize) -> Result<Vec<RawHit>> {
        let mut in_flight = InFlight { abandoned: self.abandoned.clone(), done: false };
        tokio::time::sleep(Duration::from_secs(600)).await;
        in_flight.done = true;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RawHit::new("late passage")])
    }
}

/// A backend that always faults.
pub struct FaultyBackend;

#[async_trait]
impl SearchBackend for FaultyBackend {
    async fn search(&self, _text: &str, _top_k: usize) -> Result<Vec<RawHit>> {
        Err(RagError::BackendFault { backend: "faulty".into(), message: "connection reset".into() })
    }
}

/// A generator that records prompts and answers with a fixed prefix.
#[derive(Default)]
pub struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(format!("generated answer for: {prompt}"))
    }
}

/// A generator that always fails.
pub struct DownGenerator;

#[async_trait]
impl TextGenerator for DownGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Generation("model throttled".into()))
    }
}

/// A reranker that records its input and returns it sorted by existing score.
#[derive(Default)]
pub struct RecordingReranker {
    seen: Mutex<Vec<Chunk>>,
}

impl RecordingReranker {
    pub fn seen(&self) -> Vec<Chunk> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reranker for RecordingReranker {
    async fn rerank(&self, _query: &Query, mut chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        self.seen.lock().unwrap().extend(chunks.iter().cloned());
        hybrid_rag::reranker::sort_by_score_desc(&mut chunks);
        Ok(chunks)
    }
}

/// A reranker that drops everything.
pub struct EmptyReranker;

#[async_trait]
impl Reranker for EmptyReranker {
    async fn rerank(&self, _query: &Query, _chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        Ok(Vec::new())
    }
}

pub fn ranker(a: Arc<dyn EmbeddingProvider>, b: Arc<dyn EmbeddingProvider>) -> SimilarityRanker {
    SimilarityRanker::new(EmbeddingEngines::new(a, b), EmbeddingEngine::A, TIMEOUT)
}

pub fn scripted_ranker<'a>(scores: impl IntoIterator<Item = (&'a str, f32)>) -> SimilarityRanker {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(ScriptedEmbedder::new(scores));
    ranker(embedder.clone(), embedder)
}

/// A router over two fixed backends with a concatenating synthesizer.
pub fn router_with(
    config: RagConfig,
    knowledge_base: Arc<dyn SearchBackend>,
    search_index: Arc<dyn SearchBackend>,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn TextGenerator>,
) -> HybridRouter {
    HybridRouter::builder()
        .config(config)
        .knowledge_base(Arc::new(BackendAdapter::knowledge_base(knowledge_base, TIMEOUT)))
        .search_index(Arc::new(BackendAdapter::search_index(search_index, TIMEOUT)))
        .reranker(reranker)
        .synthesizer(Arc::new(ConcatSynthesizer::new()))
        .generator(generator)
        .build()
        .unwrap()
}

//! Embedding providers and engine selection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// A provider that turns text into a fixed-length vector.
///
/// Implementations must be deterministic for identical input within a
/// process lifetime. A failed call yields [`RagError::Embedding`]; callers
/// never receive partial vectors.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_rag::EmbeddingProvider;
///
/// let provider = HashEmbeddingProvider::new(256);
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;
}

/// One of the two interchangeable embedding engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingEngine {
    /// The primary engine.
    #[default]
    #[serde(alias = "a")]
    A,
    /// The secondary engine.
    #[serde(alias = "b")]
    B,
}

impl EmbeddingEngine {
    /// The other engine.
    pub fn alternate(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl fmt::Display for EmbeddingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// The pair of embedding engines available to a ranker.
#[derive(Clone)]
pub struct EmbeddingEngines {
    a: Arc<dyn EmbeddingProvider>,
    b: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingEngines {
    /// Pair engine A with engine B.
    pub fn new(a: Arc<dyn EmbeddingProvider>, b: Arc<dyn EmbeddingProvider>) -> Self {
        Self { a, b }
    }

    /// The provider behind `engine`.
    pub fn get(&self, engine: EmbeddingEngine) -> &Arc<dyn EmbeddingProvider> {
        match engine {
            EmbeddingEngine::A => &self.a,
            EmbeddingEngine::B => &self.b,
        }
    }
}

impl fmt::Debug for EmbeddingEngines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingEngines")
            .field("a", &self.a.name())
            .field("b", &self.b.name())
            .finish()
    }
}

/// Embed `text`, failing with [`RagError::Embedding`] if the call exceeds `timeout`.
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Embedding {
            provider: provider.name().to_string(),
            message: format!("timed out after {}ms", timeout.as_millis()),
        }),
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// A local, dependency-free embedding provider using FNV-1a feature hashing.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets with a hash-derived sign, and the result is L2-normalized. Text
/// with no tokens embeds to the zero vector.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// Create a provider producing `dimensions`-length vectors.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        for token in tokens {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash"
    }
}

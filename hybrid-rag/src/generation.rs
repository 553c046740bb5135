//! Text generation used for fallback answers and generative synthesis.

use async_trait::async_trait;

use crate::error::Result;

/// A generative model that answers a prompt with text.
///
/// Failures are reported as [`RagError::Generation`](crate::RagError::Generation).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a text answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

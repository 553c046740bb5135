//! Fusing several chunks into one context string.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::chunk::Chunk;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// Fuses multiple passages into one coherent context.
#[async_trait]
pub trait ChunkSynthesizer: Send + Sync {
    /// Fuse `chunks` into a single context string.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Synthesis`] if fusion fails.
    async fn synthesize(&self, chunks: &[Chunk]) -> Result<String>;
}

fn render_passages(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(out, "[{}] {}", chunk.source(), chunk.content);
    }
    out
}

/// Joins passages with blank lines, each prefixed by its source label.
///
/// With a character budget, output is cut at the last whole passage that
/// fits; the first passage is always kept, truncated if necessary.
#[derive(Debug, Clone, Default)]
pub struct ConcatSynthesizer {
    max_chars: Option<usize>,
}

impl ConcatSynthesizer {
    /// A synthesizer with no length limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the fused context to `max_chars` characters.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }
}

#[async_trait]
impl ChunkSynthesizer for ConcatSynthesizer {
    async fn synthesize(&self, chunks: &[Chunk]) -> Result<String> {
        if chunks.is_empty() {
            return Err(RagError::Synthesis("no chunks to synthesize".to_string()));
        }
        let Some(max_chars) = self.max_chars else {
            return Ok(render_passages(chunks));
        };

        let mut kept = 1;
        while kept < chunks.len() && render_passages(&chunks[..=kept]).chars().count() <= max_chars
        {
            kept += 1;
        }
        let context: String = render_passages(&chunks[..kept]).chars().take(max_chars).collect();
        debug!(kept, total = chunks.len(), max_chars, "concatenated passages");
        Ok(context)
    }
}

/// Asks a [`TextGenerator`] to merge passages into one context.
pub struct GenerativeSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl GenerativeSynthesizer {
    /// Create a synthesizer backed by `generator`.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn prompt(chunks: &[Chunk]) -> String {
        format!(
            "Merge the following passages into one coherent, fact-preserving context. \
             Keep every technical detail, drop repetition, and do not add information \
             that is not in the passages.\n\nPassages:\n{}\n\nMerged context:",
            render_passages(chunks)
        )
    }
}

#[async_trait]
impl ChunkSynthesizer for GenerativeSynthesizer {
    async fn synthesize(&self, chunks: &[Chunk]) -> Result<String> {
        if chunks.is_empty() {
            return Err(RagError::Synthesis("no chunks to synthesize".to_string()));
        }
        let context = self.generator.generate(&Self::prompt(chunks)).await.map_err(|e| {
            error!(error = %e, "generative synthesis failed");
            RagError::Synthesis(e.to_string())
        })?;
        if context.trim().is_empty() {
            return Err(RagError::Synthesis("generator returned empty context".to_string()));
        }
        Ok(context)
    }
}

//! Error types for the `hybrid-rag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval, ranking and fallback operations.
///
/// Only [`RagError::FallbackExhausted`] ever escapes
/// [`HybridRouter::route`](crate::HybridRouter::route); every other variant is
/// absorbed at the adapter or router boundary.
#[derive(Debug, Error)]
pub enum RagError {
    /// An embedding provider was unreachable or returned an invalid response.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A knowledge backend failed. Adapters log and swallow this variant.
    #[error("Backend fault ({backend}): {message}")]
    BackendFault {
        /// The backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// Both embedding engines failed during a single rank call.
    #[error("Ranking error: {message}")]
    Ranking {
        /// A description of both engine failures.
        message: String,
    },

    /// The chunk synthesizer failed to fuse passages.
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// The text generator failed.
    #[error("Generation error: {0}")]
    Generation(String),

    /// Generation fallback failed after an earlier stage had already failed.
    #[error("Fallback exhausted ({reason}): {message}")]
    FallbackExhausted {
        /// The fallback reason that triggered generation.
        reason: String,
        /// A description of the generation failure.
        message: String,
    },

    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;

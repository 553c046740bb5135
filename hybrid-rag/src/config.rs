//! Configuration for the retrieval pipeline and hybrid router.
//!
//! A [`RagConfig`] is read once when a [`Retriever`](crate::Retriever) or
//! [`HybridRouter`](crate::HybridRouter) is built. To pick up new values,
//! load a fresh config and build a new router.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::BackendKind;
use crate::embedding::EmbeddingEngine;
use crate::error::{RagError, Result};

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "RAG_CONFIG_PATH";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/rag_config.json";

/// Configuration parameters for retrieval and routing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Minimum reranked score kept by the single-backend retriever.
    pub score_threshold: f32,
    /// Minimum reranked score kept by the hybrid router's confidence filter.
    pub router_score_threshold: f32,
    /// Embedding engine tried first when reranking.
    pub embedding_engine: EmbeddingEngine,
    /// Number of results requested per backend and kept after reranking.
    pub top_k: usize,
    /// Whether failures fall back to a direct generated answer.
    pub fallback_enabled: bool,
    /// Backend used by the single-backend retriever. `None` disables it.
    pub backend: Option<BackendKind>,
    /// Upper bound on a single backend call, in milliseconds.
    pub backend_timeout_ms: u64,
    /// Upper bound on a single embedding call, in milliseconds.
    pub embedding_timeout_ms: u64,
    /// Window during which repeated fallbacks for one reason are logged quietly.
    pub fallback_alert_ttl_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            router_score_threshold: 0.55,
            embedding_engine: EmbeddingEngine::A,
            top_k: 5,
            fallback_enabled: true,
            backend: Some(BackendKind::KnowledgeBase),
            backend_timeout_ms: 10_000,
            embedding_timeout_ms: 5_000,
            fallback_alert_ttl_secs: 300,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Backend call timeout as a [`Duration`].
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    /// Embedding call timeout as a [`Duration`].
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    /// Fallback alert suppression window as a [`Duration`].
    pub fn fallback_alert_ttl(&self) -> Duration {
        Duration::from_secs(self.fallback_alert_ttl_secs)
    }

    /// Resolve the config file path from [`CONFIG_PATH_ENV`].
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Check that every parameter is within range.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - either threshold is outside `[0, 1]`
    /// - `top_k == 0`
    /// - either timeout is zero
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("score_threshold", self.score_threshold),
            ("router_score_threshold", self.router_score_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RagError::Config(format!("{name} ({value}) must be within [0, 1]")));
            }
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.backend_timeout_ms == 0 || self.embedding_timeout_ms == 0 {
            return Err(RagError::Config("timeouts must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Load a config from a JSON file. Keys missing from the file keep
    /// their default values.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the file cannot be read or parsed, or
    /// if the resulting config fails [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("failed to read '{}': {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            RagError::Config(format!("failed to parse '{}': {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file, falling back to defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Write this config to `path` as pretty-printed JSON, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::Config(format!("failed to create '{}': {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RagError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, json).map_err(|e| {
            RagError::Config(format!("failed to write '{}': {e}", path.display()))
        })?;
        info!(path = %path.display(), "config saved");
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the retriever's minimum score.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.score_threshold = threshold;
        self
    }

    /// Set the router's confidence threshold.
    pub fn router_score_threshold(mut self, threshold: f32) -> Self {
        self.config.router_score_threshold = threshold;
        self
    }

    /// Set the embedding engine tried first.
    pub fn embedding_engine(mut self, engine: EmbeddingEngine) -> Self {
        self.config.embedding_engine = engine;
        self
    }

    /// Set the number of results requested and kept.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Enable or disable the generation fallback.
    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.config.fallback_enabled = enabled;
        self
    }

    /// Set the single-backend retriever's backend.
    pub fn backend(mut self, backend: Option<BackendKind>) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the per-call backend timeout.
    pub fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.config.backend_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-call embedding timeout.
    pub fn embedding_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedding_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the fallback alert suppression window.
    pub fn fallback_alert_ttl(mut self, ttl: Duration) -> Self {
        self.config.fallback_alert_ttl_secs = ttl.as_secs();
        self
    }

    /// Build the [`RagConfig`], validating that parameters are in range.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] under the conditions listed on
    /// [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

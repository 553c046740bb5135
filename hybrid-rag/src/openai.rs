//! OpenAI-compatible embedding and chat providers.
//!
//! This module is only available when the `openai` feature is enabled. Any
//! server speaking the `/v1/embeddings` and `/v1/chat/completions` wire
//! format can be used by changing the base URL.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// The default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// System message used for fallback answers.
const DEFAULT_SYSTEM_PROMPT: &str = "You are a solution design assistant for enterprise cloud \
     applications. Answer the user's question directly and say so when you are unsure.";

#[derive(Debug, Clone)]
struct OpenAIClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAIClient {
    fn new(api_key: String, provider: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(RagError::Config(format!("{provider} API key must not be empty")));
        }
        Ok(Self { http: reqwest::Client::new(), base_url: DEFAULT_BASE_URL.into(), api_key })
    }

    fn api_key_from_env() -> Result<String> {
        std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })
    }

    /// POST `body` to `path`, returning the parsed body or a message describing the failure.
    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<R, String> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(format!("API returned {status}: {detail}"));
        }

        response.json().await.map_err(|e| format!("failed to parse response: {e}"))
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embeddings ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use hybrid_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_dimensions(512);
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: OpenAIClient,
    model: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider with the given API key and default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: OpenAIClient::new(api_key.into(), "OpenAI")?,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIClient::api_key_from_env()?)
    }

    /// Point at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request truncated embeddings of `dims` dimensions.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "OpenAI", model = %self.model, text_len = text.len(), "embedding text");

        let request =
            EmbeddingRequest { model: &self.model, input: text, dimensions: self.request_dimensions };
        let response: EmbeddingResponse =
            self.client.post("embeddings", &request).await.map_err(|message| {
                error!(provider = "OpenAI", error = %message, "embedding request failed");
                RagError::Embedding { provider: "OpenAI".into(), message }
            })?;

        response.data.into_iter().next().map(|d| d.embedding).ok_or_else(|| {
            RagError::Embedding { provider: "OpenAI".into(), message: "empty response".into() }
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

// ── Chat completions ───────────────────────────────────────────────

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// A [`TextGenerator`] backed by an OpenAI-compatible chat completions API.
pub struct OpenAIChatGenerator {
    client: OpenAIClient,
    model: String,
    system_prompt: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIChatGenerator {
    /// Create a generator with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: OpenAIClient::new(api_key.into(), "OpenAI")?,
            model: DEFAULT_CHAT_MODEL.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_tokens: 1000,
            temperature: 0.7,
        })
    }

    /// Create a generator using the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIClient::api_key_from_env()?)
    }

    /// Point at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client.base_url = base_url.into();
        self
    }

    /// Set the chat model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Replace the system message.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the response token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl TextGenerator for OpenAIChatGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = "OpenAI", model = %self.model, prompt_len = prompt.len(), "generating");

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &self.system_prompt },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let response: ChatResponse =
            self.client.post("chat/completions", &request).await.map_err(|message| {
                error!(provider = "OpenAI", error = %message, "chat request failed");
                RagError::Generation(message)
            })?;

        response
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| RagError::Generation("response contained no message content".into()))
    }
}

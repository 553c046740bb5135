//! HTTP knowledge backends.
//!
//! This module is only available when the `http` feature is enabled.
//!
//! - [`HttpKnowledgeBase`] calls a managed knowledge base's `retrieve`
//!   endpoint (vector search over ingested documents).
//! - [`OpenSearchIndex`] runs a `match` query against an OpenSearch (or
//!   Elasticsearch) index.
//!
//! Both report failures as [`RagError::BackendFault`]; the
//! [`BackendAdapter`](crate::BackendAdapter) wrapping them absorbs it.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::backend::{RawHit, SearchBackend};
use crate::chunk::{Metadata, MetadataValue};
use crate::error::{RagError, Result};

/// Keep the scalar entries of a JSON object; nested values are dropped.
fn scalar_metadata(map: serde_json::Map<String, Value>) -> Metadata {
    map.into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => MetadataValue::Text(s),
                Value::Bool(b) => MetadataValue::Flag(b),
                Value::Number(n) => MetadataValue::Number(n.as_f64()?),
                _ => return None,
            };
            Some((key, value))
        })
        .collect()
}

fn fault(backend: &str, message: impl Into<String>) -> RagError {
    RagError::BackendFault { backend: backend.to_string(), message: message.into() }
}

async fn post_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    body: &Value,
    backend: &str,
) -> Result<T> {
    let response =
        request.json(body).send().await.map_err(|e| fault(backend, format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(fault(backend, format!("returned {status}: {body}")));
    }

    response.json().await.map_err(|e| fault(backend, format!("failed to parse response: {e}")))
}

// ── Managed knowledge base ─────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RetrievalItem>,
}

#[derive(Deserialize)]
struct RetrievalItem {
    #[serde(default)]
    content: RetrievalContent,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
    #[serde(default)]
    score: Option<f32>,
}

#[derive(Deserialize, Default)]
struct RetrievalContent {
    #[serde(default)]
    text: String,
}

/// A [`SearchBackend`] over a managed knowledge base's retrieve API.
///
/// Sends `{"retrievalQuery": {"text": ...}, "retrievalConfiguration":
/// {"vectorSearchConfiguration": {"numberOfResults": k}}}` to
/// `{endpoint}/knowledgebases/{id}/retrieve`.
pub struct HttpKnowledgeBase {
    client: reqwest::Client,
    endpoint: String,
    knowledge_base_id: String,
    bearer_token: Option<String>,
}

impl HttpKnowledgeBase {
    /// Create a client for knowledge base `knowledge_base_id` at `endpoint`.
    pub fn new(endpoint: impl Into<String>, knowledge_base_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            knowledge_base_id: knowledge_base_id.into(),
            bearer_token: None,
        }
    }

    /// Authenticate requests with a bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/knowledgebases/{}/retrieve",
            self.endpoint.trim_end_matches('/'),
            self.knowledge_base_id
        )
    }
}

#[async_trait]
impl SearchBackend for HttpKnowledgeBase {
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<RawHit>> {
        let body = json!({
            "retrievalQuery": { "text": text },
            "retrievalConfiguration": {
                "vectorSearchConfiguration": { "numberOfResults": top_k }
            }
        });
        let mut request = self.client.post(self.url());
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response: RetrieveResponse = post_json(request, &body, "knowledge_base").await?;
        debug!(
            knowledge_base_id = %self.knowledge_base_id,
            hits = response.retrieval_results.len(),
            "knowledge base responded"
        );

        Ok(response
            .retrieval_results
            .into_iter()
            .map(|item| RawHit {
                content: item.content.text,
                metadata: scalar_metadata(item.metadata),
                score: item.score,
            })
            .collect())
    }
}

// ── OpenSearch ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: serde_json::Map<String, Value>,
}

/// A [`SearchBackend`] over an OpenSearch index.
///
/// Passages are read from `_source.<content_field>` (default `content`) and
/// metadata from `_source.metadata`; `_score` is kept as the native score.
pub struct OpenSearchIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    content_field: String,
    basic_auth: Option<(String, String)>,
}

impl OpenSearchIndex {
    /// Create a client for `index` on the cluster at `base_url`.
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            index: index.into(),
            content_field: "content".to_string(),
            basic_auth: None,
        }
    }

    /// Read passage text from a different `_source` field.
    pub fn with_content_field(mut self, field: impl Into<String>) -> Self {
        self.content_field = field.into();
        self
    }

    /// Authenticate with HTTP basic auth.
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    fn parse_hit(&self, hit: SearchHit) -> RawHit {
        let mut source = hit.source;
        let content = match source.remove(&self.content_field) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let metadata = match source.remove("metadata") {
            Some(Value::Object(map)) => scalar_metadata(map),
            _ => Metadata::new(),
        };
        RawHit { content, metadata, score: hit.score }
    }
}

#[async_trait]
impl SearchBackend for OpenSearchIndex {
    async fn search(&self, text: &str, top_k: usize) -> Result<Vec<RawHit>> {
        let url = format!("{}/{}/_search", self.base_url.trim_end_matches('/'), self.index);
        let mut field_query = serde_json::Map::new();
        field_query.insert(self.content_field.clone(), Value::String(text.to_string()));
        let body = json!({
            "size": top_k,
            "query": { "match": Value::Object(field_query) }
        });
        let mut request = self.client.post(url);
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }

        let response: SearchResponse = post_json(request, &body, "search_index").await?;
        debug!(index = %self.index, hits = response.hits.hits.len(), "search index responded");

        Ok(response.hits.hits.into_iter().map(|hit| self.parse_hit(hit)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_metadata_values_are_dropped() {
        let map = json!({ "title": "VPC", "page": 4, "draft": false, "tags": ["a", "b"] });
        let Value::Object(map) = map else { unreachable!() };
        let metadata = scalar_metadata(map);
        assert_eq!(metadata.len(), 3);
        assert_eq!(metadata.get("page"), Some(&MetadataValue::Number(4.0)));
        assert!(!metadata.contains_key("tags"));
    }

    #[test]
    fn opensearch_hit_reads_configured_content_field() {
        let index = OpenSearchIndex::new("http://localhost:9200", "docs").with_content_field("body");
        let hit: SearchHit = serde_json::from_value(json!({
            "_score": 7.25,
            "_source": { "body": "IAM roles", "metadata": { "title": "IAM" } }
        }))
        .unwrap();

        let raw = index.parse_hit(hit);
        assert_eq!(raw.content, "IAM roles");
        assert_eq!(raw.score, Some(7.25));
        assert_eq!(raw.metadata.get("title"), Some(&MetadataValue::from("IAM")));
    }

    #[test]
    fn knowledge_base_response_tolerates_missing_fields() {
        let response: RetrieveResponse = serde_json::from_value(json!({
            "retrievalResults": [ { "content": { "text": "S3" } }, {} ]
        }))
        .unwrap();
        assert_eq!(response.retrieval_results.len(), 2);
        assert_eq!(response.retrieval_results[1].content.text, "");
    }
}

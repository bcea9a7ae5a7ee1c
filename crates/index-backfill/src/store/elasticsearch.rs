//! Elasticsearch document store.
//!
//! Uses the scroll API for traversal and the bulk API for writes. Updates are
//! sent as partial `doc` merges, never as full-document overwrites.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::document::WriteAction;
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryConfig};
use crate::store::common::{create_http_client, handle_http_error, DEFAULT_TIMEOUT};
use crate::store::{BulkItemResult, BulkResponse, DocumentStore, SearchPage, SearchRequest};

/// Configuration for the Elasticsearch backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Elasticsearch URL (e.g., http://localhost:9200).
    pub url: String,
    /// Optional username for Basic auth.
    pub username: Option<String>,
    /// Optional password for Basic auth.
    pub password: Option<String>,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries of the initial search on transient errors.
    #[serde(default = "default_search_retries")]
    pub search_retries: u32,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_search_retries() -> u32 {
    3
}

/// Search response from Elasticsearch. Hits stay raw so that one malformed
/// hit only fails its own document.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: HitsContainer,
}

#[derive(Debug, Deserialize)]
struct HitsContainer {
    hits: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct BulkApiResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkApiItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkApiItem {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    error: Option<Value>,
}

/// Encodes actions as a bulk NDJSON body.
pub fn encode_bulk(actions: &[WriteAction]) -> Result<String> {
    let mut body = String::new();
    for action in actions {
        let (meta, source) = match action {
            WriteAction::Update { target, doc } => (
                json!({"update": {"_index": target.index, "_type": target.doc_type, "_id": target.id}}),
                json!({ "doc": doc }),
            ),
            WriteAction::Insert {
                index,
                doc_type,
                doc,
            } => (
                json!({"index": {"_index": index, "_type": doc_type}}),
                Value::Object(doc.clone()),
            ),
        };
        body.push_str(&serde_json::to_string(&meta)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&source)?);
        body.push('\n');
    }
    Ok(body)
}

fn error_reason(error: &Value) -> String {
    match error.get("reason").and_then(Value::as_str) {
        Some(reason) => match error.get("type").and_then(Value::as_str) {
            Some(kind) => format!("{kind}: {reason}"),
            None => reason.to_string(),
        },
        None => error.to_string(),
    }
}

impl From<BulkApiResponse> for BulkResponse {
    fn from(response: BulkApiResponse) -> Self {
        let items = response
            .items
            .into_iter()
            .filter_map(|entry| entry.into_iter().next())
            .map(|(action, item)| BulkItemResult {
                action,
                index: item.index,
                id: item.id,
                status: item.status,
                error: item.error.as_ref().map(error_reason),
            })
            .collect();
        Self { items }
    }
}

/// Elasticsearch document store.
pub struct ElasticsearchStore {
    config: ElasticsearchConfig,
    client: Client,
    search_retry: RetryConfig,
}

impl ElasticsearchStore {
    /// Creates a new store with a configured HTTP client.
    pub fn new(config: ElasticsearchConfig) -> Self {
        let client = create_http_client(Duration::from_secs(config.timeout_secs));
        let search_retry = RetryConfig::transient(config.search_retries);
        Self {
            config,
            client,
            search_retry,
        }
    }

    /// Overrides the retry policy of the initial search.
    #[must_use]
    pub fn with_search_retry(mut self, retry: RetryConfig) -> Self {
        self.search_retry = retry;
        self
    }

    /// Appends percent-encoded path segments to the backend URL.
    fn build_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| Error::Config(format!("Invalid URL '{}': {}", self.config.url, e)))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("URL '{}' cannot hold a path", self.config.url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn build_search_url(&self, request: &SearchRequest) -> Result<Url> {
        let mut url =
            self.build_url(&[request.index.as_str(), request.doc_type.as_str(), "_search"])?;
        url.query_pairs_mut().append_pair("scroll", &request.keep_alive);
        Ok(url)
    }

    /// Makes an authenticated request.
    fn build_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url);

        if let Some(api_key) = &self.config.api_key {
            req = req.header("Authorization", format!("ApiKey {}", api_key));
        } else if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            req = req.basic_auth(user, Some(pass));
        }

        req
    }

    /// Sends a request, mapping error statuses to errors.
    async fn send(&self, req: reqwest::RequestBuilder, operation: &str) -> Result<reqwest::Response> {
        let response = req.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(handle_http_error(status.as_u16(), &body, operation));
        }
        Ok(response)
    }

    async fn read_page(response: reqwest::Response) -> Result<SearchPage> {
        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Failed to parse search response: {}", e)))?;
        Ok(SearchPage {
            hits: search.hits.hits,
            scroll_id: search.scroll_id,
        })
    }

    async fn search_once(&self, request: &SearchRequest) -> Result<SearchPage> {
        let url = self.build_search_url(request)?;
        let body = json!({
            "query": request.query.clone().unwrap_or_else(|| json!({ "match_all": {} })),
            "size": request.page_size,
            "sort": request.sort,
        });
        let response = self
            .send(self.build_request(Method::POST, url).json(&body), "search")
            .await?;
        Self::read_page(response).await
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    fn backend_type(&self) -> &'static str {
        "elasticsearch"
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        with_retry(&self.search_retry, "search", || self.search_once(request)).await
    }

    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchPage> {
        let url = self.build_url(&["_search", "scroll"])?;
        let body = json!({ "scroll": keep_alive, "scroll_id": scroll_id });
        let response = self
            .send(self.build_request(Method::POST, url).json(&body), "scroll")
            .await?;
        Self::read_page(response).await
    }

    async fn bulk(&self, actions: &[WriteAction]) -> Result<BulkResponse> {
        let url = self.build_url(&["_bulk"])?;
        let body = encode_bulk(actions)?;
        let response = self
            .send(
                self.build_request(Method::POST, url)
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
                "bulk",
            )
            .await?;
        let bulk: BulkApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Failed to parse bulk response: {}", e)))?;
        debug!(items = bulk.items.len(), errors = bulk.errors, "Bulk response");
        Ok(bulk.into())
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let url = self.build_url(&["_search", "scroll"])?;
        let body = json!({ "scroll_id": [scroll_id] });
        self.send(self.build_request(Method::DELETE, url).json(&body), "clear scroll")
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "elasticsearch_tests.rs"]
mod tests;

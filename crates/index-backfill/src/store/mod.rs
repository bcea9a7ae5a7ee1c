//! Document store boundary.
//!
//! The pipeline only needs paginated scroll search and batched writes. The
//! Elasticsearch implementation talks to a real cluster; the in-memory one
//! backs tests and local experiments.

pub mod common;
pub mod elasticsearch;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::WriteAction;
use crate::error::Result;

/// Initial scroll search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Index to search.
    pub index: String,
    /// Type tag to search.
    pub doc_type: String,
    /// Query DSL; `None` matches everything.
    pub query: Option<Value>,
    /// Hits per page.
    pub page_size: usize,
    /// Scroll keep-alive (e.g. `5m`).
    pub keep_alive: String,
    /// Sort clauses.
    pub sort: Vec<Value>,
}

impl SearchRequest {
    /// Search in index-native document order, which lets the scroll cursor
    /// visit every document exactly once.
    pub fn in_index_order(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        query: Option<Value>,
        page_size: usize,
        keep_alive: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            query,
            page_size,
            keep_alive: keep_alive.into(),
            sort: vec![Value::String("_doc".to_string())],
        }
    }
}

/// One page of raw hits plus the cursor for the next one.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Raw hits (`_index`, `_type`, `_id`, `_source`).
    pub hits: Vec<Value>,
    /// Scroll id to pass to the next [`DocumentStore::scroll`] call.
    pub scroll_id: Option<String>,
}

/// Outcome of one bulk item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
    /// Action name (`update`, `index`).
    pub action: String,
    /// Index the item targeted.
    pub index: String,
    /// Document id, if known.
    pub id: Option<String>,
    /// HTTP-like status of the item.
    pub status: u16,
    /// Failure reason, `None` on success.
    pub error: Option<String>,
}

impl BulkItemResult {
    /// Returns `true` if the item failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }
}

/// Per-item results of a bulk write.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    /// One entry per submitted action, in order.
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    /// Failed items only.
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| item.is_failure())
    }
}

/// Trait for document stores the pipeline can traverse and write to.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the backend type name.
    fn backend_type(&self) -> &'static str;

    /// Run the initial search and open a scroll cursor.
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage>;

    /// Fetch the next page, renewing the cursor for `keep_alive`.
    async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchPage>;

    /// Submit a batch of writes.
    ///
    /// Fails only on transport or authentication errors; item failures are
    /// reported in the response.
    async fn bulk(&self, actions: &[WriteAction]) -> Result<BulkResponse>;

    /// Release a scroll cursor.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_sorts_by_doc() {
        let request = SearchRequest::in_index_order("projects", "download", None, 100, "5m");
        assert_eq!(request.sort, vec![serde_json::json!("_doc")]);
    }

    #[test]
    fn test_bulk_response_failures() {
        let ok = BulkItemResult {
            action: "update".to_string(),
            index: "projects".to_string(),
            id: Some("1".to_string()),
            status: 200,
            error: None,
        };
        let failed = BulkItemResult {
            status: 409,
            error: Some("version conflict".to_string()),
            ..ok.clone()
        };
        let response = BulkResponse {
            items: vec![ok, failed],
        };

        assert_eq!(response.failures().count(), 1);
    }
}

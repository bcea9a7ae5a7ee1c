//! In-memory document store.
//!
//! Scroll cursors page over a snapshot taken at search time. Queries are
//! ignored: every document of the requested index and type matches. Faults
//! can be injected to exercise the pipeline's failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::document::{Document, DocumentRef, WriteAction};
use crate::error::{Error, Result};
use crate::store::{BulkItemResult, BulkResponse, DocumentStore, SearchPage, SearchRequest};

#[derive(Debug)]
struct Cursor {
    hits: Vec<Value>,
    offset: usize,
    page_size: usize,
}

impl Cursor {
    fn next_page(&mut self) -> Vec<Value> {
        let end = (self.offset + self.page_size).min(self.hits.len());
        let page = self.hits[self.offset..end].to_vec();
        self.offset = end;
        page
    }
}

#[derive(Debug, Default)]
struct Faults {
    search: bool,
    scroll_after: Option<usize>,
    bulk: bool,
    clear_scroll: bool,
    rejected_ids: HashSet<String>,
}

#[derive(Debug, Default)]
struct State {
    documents: Vec<Document>,
    cursors: HashMap<String, Cursor>,
    next_scroll: u64,
    next_id: u64,
    fetches: usize,
    scrolls: usize,
    bulk_batches: Vec<usize>,
    cleared: Vec<String>,
    faults: Faults,
}

/// Document store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn to_hit(document: &Document) -> Value {
    json!({
        "_index": document.reference.index,
        "_type": document.reference.doc_type,
        "_id": document.reference.id,
        "_source": document.source,
    })
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a document, replacing any document with the same identity.
    pub fn put(&self, index: &str, doc_type: &str, id: &str, source: Value) {
        let reference = DocumentRef {
            index: index.to_string(),
            doc_type: doc_type.to_string(),
            id: id.to_string(),
        };
        let source = match source {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut state = self.state();
        state.documents.retain(|doc| doc.reference != reference);
        state.documents.push(Document::new(reference, source));
    }

    /// Returns a stored document.
    pub fn get(&self, index: &str, doc_type: &str, id: &str) -> Option<Document> {
        self.state()
            .documents
            .iter()
            .find(|doc| {
                doc.reference.index == index
                    && doc.reference.doc_type == doc_type
                    && doc.reference.id == id
            })
            .cloned()
    }

    /// Returns all documents of an index, in insertion order.
    pub fn documents(&self, index: &str) -> Vec<Document> {
        self.state()
            .documents
            .iter()
            .filter(|doc| doc.reference.index == index)
            .cloned()
            .collect()
    }

    /// Number of page fetches (initial search plus scrolls).
    pub fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    /// Number of actions in each bulk call received so far.
    pub fn bulk_batches(&self) -> Vec<usize> {
        self.state().bulk_batches.clone()
    }

    /// Scroll ids released so far.
    pub fn cleared_scrolls(&self) -> Vec<String> {
        self.state().cleared.clone()
    }

    /// Makes the initial search fail.
    #[must_use]
    pub fn with_failing_search(self) -> Self {
        self.state().faults.search = true;
        self
    }

    /// Makes scroll calls fail once `succeeded` calls have gone through.
    #[must_use]
    pub fn with_failing_scroll(self, succeeded: usize) -> Self {
        self.state().faults.scroll_after = Some(succeeded);
        self
    }

    /// Makes every bulk submission fail at the transport level.
    #[must_use]
    pub fn with_failing_bulk(self) -> Self {
        self.state().faults.bulk = true;
        self
    }

    /// Makes scroll release fail.
    #[must_use]
    pub fn with_failing_clear_scroll(self) -> Self {
        self.state().faults.clear_scroll = true;
        self
    }

    /// Rejects bulk updates targeting `id` with a version conflict.
    #[must_use]
    pub fn rejecting_updates_for(self, id: &str) -> Self {
        self.state().faults.rejected_ids.insert(id.to_string());
        self
    }
}

fn apply(state: &mut State, action: &WriteAction) -> BulkItemResult {
    match action {
        WriteAction::Update { target, doc } => {
            let mut result = BulkItemResult {
                action: "update".to_string(),
                index: target.index.clone(),
                id: Some(target.id.clone()),
                status: 200,
                error: None,
            };
            if state.faults.rejected_ids.contains(&target.id) {
                result.status = 409;
                result.error = Some("version_conflict_engine_exception".to_string());
                return result;
            }
            match state.documents.iter_mut().find(|d| &d.reference == target) {
                Some(document) => document.merge(doc),
                None => {
                    result.status = 404;
                    result.error = Some("document_missing_exception".to_string());
                }
            }
            result
        }
        WriteAction::Insert {
            index,
            doc_type,
            doc,
        } => {
            state.next_id += 1;
            let id = format!("mem-{}", state.next_id);
            state.documents.push(Document::new(
                DocumentRef {
                    index: index.clone(),
                    doc_type: doc_type.clone(),
                    id: id.clone(),
                },
                doc.clone(),
            ));
            BulkItemResult {
                action: "index".to_string(),
                index: index.clone(),
                id: Some(id),
                status: 201,
                error: None,
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        let mut state = self.state();
        state.fetches += 1;
        if state.faults.search {
            return Err(Error::Backend("search failed with status 404: index_not_found_exception".to_string()));
        }

        let hits = state
            .documents
            .iter()
            .filter(|doc| {
                doc.reference.index == request.index && doc.reference.doc_type == request.doc_type
            })
            .map(to_hit)
            .collect();
        let mut cursor = Cursor {
            hits,
            offset: 0,
            page_size: request.page_size.max(1),
        };
        let page = cursor.next_page();

        state.next_scroll += 1;
        let scroll_id = format!("scroll-{}", state.next_scroll);
        state.cursors.insert(scroll_id.clone(), cursor);

        Ok(SearchPage {
            hits: page,
            scroll_id: Some(scroll_id),
        })
    }

    async fn scroll(&self, scroll_id: &str, _keep_alive: &str) -> Result<SearchPage> {
        let mut state = self.state();
        state.fetches += 1;
        if state.faults.scroll_after.is_some_and(|after| state.scrolls >= after) {
            return Err(Error::Backend(
                "scroll failed with status 404: search_context_missing_exception".to_string(),
            ));
        }
        state.scrolls += 1;

        let cursor = state.cursors.get_mut(scroll_id).ok_or_else(|| {
            Error::Backend(format!("scroll failed: no search context for {scroll_id}"))
        })?;
        Ok(SearchPage {
            hits: cursor.next_page(),
            scroll_id: Some(scroll_id.to_string()),
        })
    }

    async fn bulk(&self, actions: &[WriteAction]) -> Result<BulkResponse> {
        let mut state = self.state();
        if state.faults.bulk {
            return Err(Error::Backend("bulk failed with status 503: unavailable".to_string()));
        }
        state.bulk_batches.push(actions.len());
        let items = actions.iter().map(|action| apply(&mut state, action)).collect();
        Ok(BulkResponse { items })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let mut state = self.state();
        if state.faults.clear_scroll {
            return Err(Error::Backend("clear scroll failed with status 500".to_string()));
        }
        state.cursors.remove(scroll_id);
        state.cleared.push(scroll_id.to_string());
        Ok(())
    }
}

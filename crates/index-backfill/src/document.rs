//! Documents read from the index and the write actions produced for them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TransformError;

/// Identity of a stored document: (index, type tag, id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Index (collection) name.
    pub index: String,
    /// Type tag.
    pub doc_type: String,
    /// Document id.
    pub id: String,
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.index, self.doc_type, self.id)
    }
}

/// A document as returned by a search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Where the document lives.
    pub reference: DocumentRef,
    /// The document body (`_source`).
    pub source: Map<String, Value>,
}

impl Document {
    /// Creates a document from its identity and body.
    pub fn new(reference: DocumentRef, source: Map<String, Value>) -> Self {
        Self { reference, source }
    }

    /// Builds a document from a raw search hit.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] if `_id`, `_index`, `_type` or an object
    /// `_source` is missing.
    pub fn from_hit(hit: &Value) -> Result<Self, TransformError> {
        let text = |name: &str| -> Result<String, TransformError> {
            hit.get(name)
                .ok_or_else(|| TransformError::MissingField(name.to_string()))?
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| TransformError::invalid(name, "a string"))
        };
        let reference = DocumentRef {
            index: text("_index")?,
            doc_type: text("_type")?,
            id: text("_id")?,
        };
        let source = match hit.get("_source") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(TransformError::invalid("_source", "an object")),
            None => return Err(TransformError::MissingField("_source".to_string())),
        };
        Ok(Self { reference, source })
    }

    /// Returns `true` if the body has a top-level `field`.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.source.contains_key(field)
    }

    /// Applies a partial update: listed top-level fields are replaced,
    /// siblings are kept.
    pub fn merge(&mut self, doc: &Map<String, Value>) {
        for (key, value) in doc {
            self.source.insert(key.clone(), value.clone());
        }
    }
}

/// A write produced by a strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteAction {
    /// Partial merge of top-level fields into an existing document.
    Update {
        /// Document to update.
        target: DocumentRef,
        /// Fields to replace.
        doc: Map<String, Value>,
    },
    /// New document in another index, id assigned by the backend.
    Insert {
        /// Target index.
        index: String,
        /// Target type tag.
        doc_type: String,
        /// Full document body.
        doc: Map<String, Value>,
    },
}

impl WriteAction {
    /// Creates an update for `document`.
    pub fn update(document: &Document, doc: Map<String, Value>) -> Self {
        Self::Update {
            target: document.reference.clone(),
            doc,
        }
    }

    /// Creates an insert into `index`.
    pub fn insert(index: impl Into<String>, doc_type: impl Into<String>, doc: Map<String, Value>) -> Self {
        Self::Insert {
            index: index.into(),
            doc_type: doc_type.into(),
            doc,
        }
    }

    /// Returns `true` for updates.
    #[must_use]
    pub fn is_update(&self) -> bool {
        matches!(self, Self::Update { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_hit() {
        let hit = json!({
            "_index": "initializr-2015",
            "_type": "request",
            "_id": "abc",
            "_source": {"bootVersion": "1.5.2.RELEASE"}
        });
        let doc = Document::from_hit(&hit).unwrap();

        assert_eq!(doc.reference.to_string(), "initializr-2015/request/abc");
        assert_eq!(doc.source["bootVersion"], "1.5.2.RELEASE");
    }

    #[test]
    fn test_from_hit_missing_id() {
        let hit = json!({"_index": "i", "_type": "t", "_source": {}});
        assert_eq!(
            Document::from_hit(&hit).unwrap_err(),
            TransformError::MissingField("_id".to_string())
        );
    }

    #[test]
    fn test_from_hit_source_not_object() {
        let hit = json!({"_index": "i", "_type": "t", "_id": "1", "_source": [1, 2]});
        assert!(matches!(
            Document::from_hit(&hit),
            Err(TransformError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_merge_keeps_siblings() {
        let hit = json!({"_index": "i", "_type": "t", "_id": "1", "_source": {"a": 1, "b": 2}});
        let mut doc = Document::from_hit(&hit).unwrap();
        let patch = json!({"b": 3, "c": 4});

        doc.merge(patch.as_object().unwrap());

        assert_eq!(Value::Object(doc.source), json!({"a": 1, "b": 3, "c": 4}));
    }
}

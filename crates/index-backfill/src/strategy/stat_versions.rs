//! Per-stat version annotation of download documents.
//!
//! Each stat gains either `versionMajor`/`versionMinor` or `releaseTrain`.
//! Stats already carrying one of those fields are left alone.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::MigrationStrategy;
use crate::aggregation::StatRecord;
use crate::document::{Document, WriteAction};
use crate::error::TransformError;
use crate::version::classify;

const ANNOTATION_FIELDS: [&str; 3] = ["versionMajor", "versionMinor", "releaseTrain"];

/// Annotates stats with their version generation.
pub struct StatVersionStrategy;

impl StatVersionStrategy {
    /// Returns the annotated stat, or `None` if nothing changes.
    fn annotate(position: usize, stat: &Value) -> Result<Option<Value>, TransformError> {
        let record = StatRecord::from_value(position, stat)?;
        let Some(object) = stat.as_object() else {
            return Ok(None);
        };
        if ANNOTATION_FIELDS.iter().any(|field| object.contains_key(*field)) {
            return Ok(None);
        }

        let reference = classify(&record.version);
        let mut annotated = object.clone();
        match (reference.major, reference.minor) {
            (Some(major), minor) => {
                debug!(version = %reference.id, %major, ?minor, "Set major and minor");
                annotated.insert("versionMajor".to_string(), Value::String(major));
                if let Some(minor) = minor {
                    annotated.insert("versionMinor".to_string(), Value::String(minor));
                }
            }
            (None, Some(train)) => {
                debug!(version = %reference.id, %train, "Set release train");
                annotated.insert("releaseTrain".to_string(), Value::String(train));
            }
            (None, None) => {
                warn!(version = %reference.id, count = record.count, "Could not classify stat version");
                return Ok(None);
            }
        }
        Ok(Some(Value::Object(annotated)))
    }
}

impl MigrationStrategy for StatVersionStrategy {
    fn name(&self) -> &'static str {
        "stat-versions"
    }

    fn transform(&self, document: &Document) -> Result<Vec<WriteAction>, TransformError> {
        let stats = match document.source.get("stats") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(stats)) => stats,
            Some(_) => return Err(TransformError::invalid("stats", "an array")),
        };

        let mut modified = false;
        let mut updated = Vec::with_capacity(stats.len());
        for (position, stat) in stats.iter().enumerate() {
            match Self::annotate(position, stat)? {
                Some(annotated) => {
                    modified = true;
                    updated.push(annotated);
                }
                None => updated.push(stat.clone()),
            }
        }

        if !modified {
            return Ok(Vec::new());
        }
        let mut doc = Map::new();
        doc.insert("stats".to_string(), Value::Array(updated));
        Ok(vec![WriteAction::update(document, doc)])
    }
}

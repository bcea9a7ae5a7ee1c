//! `dependenciesId` backfill for project generation requests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::MigrationStrategy;
use crate::document::{Document, WriteAction};
use crate::error::TransformError;

/// Target field holding the canonical dependency key.
pub const DEPENDENCIES_ID_FIELD: &str = "dependenciesId";

/// Value used when a request selected no dependency.
pub const NO_DEPENDENCIES: &str = "_none";

/// Configuration of the `dependencies` strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependenciesConfig {
    /// Field listing the selected dependency names.
    #[serde(default = "default_dependencies_field")]
    pub dependencies_field: String,
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            dependencies_field: default_dependencies_field(),
        }
    }
}

pub(crate) fn default_dependencies_field() -> String {
    "dependencies".to_string()
}

/// Computes the order-insensitive dependency key of a document: names sorted
/// and joined with a single space, or [`NO_DEPENDENCIES`].
///
/// # Errors
///
/// Returns a [`TransformError`] if the field is not a list of strings.
pub fn dependencies_id(document: &Document, field: &str) -> Result<String, TransformError> {
    let mut names = match document.source.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| TransformError::invalid(field, "a list of strings"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(TransformError::invalid(field, "a list of strings")),
    };
    if names.is_empty() {
        return Ok(NO_DEPENDENCIES.to_string());
    }
    names.sort_unstable();
    Ok(names.join(" "))
}

/// Adds `dependenciesId` to documents that lack it.
pub struct DependenciesIdStrategy {
    config: DependenciesConfig,
}

impl DependenciesIdStrategy {
    /// Creates the strategy.
    pub fn new(config: DependenciesConfig) -> Self {
        Self { config }
    }
}

impl MigrationStrategy for DependenciesIdStrategy {
    fn name(&self) -> &'static str {
        "dependencies"
    }

    fn transform(&self, document: &Document) -> Result<Vec<WriteAction>, TransformError> {
        if document.has(DEPENDENCIES_ID_FIELD) {
            return Ok(Vec::new());
        }
        let id = dependencies_id(document, &self.config.dependencies_field)?;
        let mut doc = Map::new();
        doc.insert(DEPENDENCIES_ID_FIELD.to_string(), Value::String(id));
        Ok(vec![WriteAction::update(document, doc)])
    }
}

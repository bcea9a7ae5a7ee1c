//! Enrichment of project generation requests with a structured version and a
//! canonical dependency key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::dependencies::{default_dependencies_field, dependencies_id, DEPENDENCIES_ID_FIELD};
use super::MigrationStrategy;
use crate::document::{Document, WriteAction};
use crate::error::TransformError;
use crate::version::{classify, VersionReference};

/// Target field holding the structured version.
pub const VERSION_FIELD: &str = "version";

/// Configuration of the `project` strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Field holding the raw version string.
    #[serde(default = "default_version_source")]
    pub version_source: String,
    /// Field listing the selected dependency names.
    #[serde(default = "default_dependencies_field")]
    pub dependencies_field: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            version_source: default_version_source(),
            dependencies_field: default_dependencies_field(),
        }
    }
}

fn default_version_source() -> String {
    "bootVersion".to_string()
}

/// Adds `version` and `dependenciesId` to documents missing them.
pub struct ProjectStrategy {
    config: ProjectConfig,
}

impl ProjectStrategy {
    /// Creates the strategy.
    pub fn new(config: ProjectConfig) -> Self {
        Self { config }
    }

    /// Classifies the source version, if there is a classifiable one.
    fn derive_version(&self, document: &Document) -> Result<Option<VersionReference>, TransformError> {
        let raw = match document.source.get(&self.config.version_source) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(raw)) => raw,
            Some(_) => {
                return Err(TransformError::invalid(
                    self.config.version_source.clone(),
                    "a string",
                ))
            }
        };
        let reference = classify(raw);
        if reference.is_classified() {
            debug!(version = %reference.id, major = ?reference.major, minor = ?reference.minor, "Derived version");
            Ok(Some(reference))
        } else {
            Ok(None)
        }
    }
}

impl MigrationStrategy for ProjectStrategy {
    fn name(&self) -> &'static str {
        "project"
    }

    fn transform(&self, document: &Document) -> Result<Vec<WriteAction>, TransformError> {
        let needs_version = !document.has(VERSION_FIELD);
        let needs_dependencies_id = !document.has(DEPENDENCIES_ID_FIELD);
        if !needs_version && !needs_dependencies_id {
            return Ok(Vec::new());
        }

        let mut doc = Map::new();
        if needs_version {
            if let Some(reference) = self.derive_version(document)? {
                doc.insert(VERSION_FIELD.to_string(), reference.to_json());
            }
        }
        if needs_dependencies_id {
            let id = dependencies_id(document, &self.config.dependencies_field)?;
            doc.insert(DEPENDENCIES_ID_FIELD.to_string(), Value::String(id));
        }

        if doc.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![WriteAction::update(document, doc)])
        }
    }
}

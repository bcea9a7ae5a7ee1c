//! Migration strategies, one per document family.
//!
//! A strategy looks at one document and returns the writes needed to bring it
//! up to date. It must detect its own prior effects (the target fields are
//! already present) and return no update in that case, so that a run can be
//! repeated from scratch at any time.

pub mod dependencies;
pub mod downloads;
pub mod project;
pub mod stat_versions;

use serde_json::{Map, Value};

use crate::config::StrategyConfig;
use crate::document::{Document, WriteAction};
use crate::error::TransformError;

/// Per-document transformation contract.
///
/// Implementations must not have side effects beyond the returned actions.
pub trait MigrationStrategy: Send + Sync {
    /// Strategy name, as used in configuration files.
    fn name(&self) -> &'static str;

    /// Computes the writes for `document`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] if the document is malformed. The failure
    /// only affects this document.
    fn transform(&self, document: &Document) -> Result<Vec<WriteAction>, TransformError>;
}

/// Create a strategy from configuration.
pub fn create_strategy(config: &StrategyConfig) -> Box<dyn MigrationStrategy> {
    match config {
        StrategyConfig::Project(cfg) => Box::new(project::ProjectStrategy::new(cfg.clone())),
        StrategyConfig::Dependencies(cfg) => {
            Box::new(dependencies::DependenciesIdStrategy::new(cfg.clone()))
        }
        StrategyConfig::StatVersions => Box::new(stat_versions::StatVersionStrategy),
        StrategyConfig::DownloadGenerations(cfg) => {
            Box::new(downloads::DownloadGenerationStrategy::new(cfg.clone()))
        }
        StrategyConfig::DownloadFlatten(cfg) => {
            Box::new(downloads::DownloadFlattenStrategy::new(cfg.clone()))
        }
    }
}

/// Fields identifying a module's download document, copied into derived
/// documents when present.
pub(crate) const MODULE_IDENTITY_FIELDS: [&str; 5] =
    ["projectId", "groupId", "artifactId", "from", "to"];

/// Copies the module identity fields of `document` into a new body.
pub(crate) fn module_identity(document: &Document) -> Map<String, Value> {
    MODULE_IDENTITY_FIELDS
        .iter()
        .filter_map(|field| {
            document
                .source
                .get(*field)
                .map(|value| ((*field).to_string(), value.clone()))
        })
        .collect()
}

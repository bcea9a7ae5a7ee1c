//! Configuration types for index-backfill.

use serde::{Deserialize, Serialize};

use crate::store::common::validate_url;
use crate::store::elasticsearch::ElasticsearchConfig;
use crate::strategy::dependencies::DependenciesConfig;
use crate::strategy::downloads::{DownloadFlattenConfig, DownloadGenerationsConfig};
use crate::strategy::project::ProjectConfig;

/// Main backfill configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Search backend connection.
    pub backend: ElasticsearchConfig,
    /// Jobs to run, in order.
    pub jobs: Vec<JobConfig>,
    /// Run options.
    #[serde(default)]
    pub options: BackfillOptions,
}

/// One pass of a strategy over the documents matched by a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Index to traverse.
    pub index: String,
    /// Type tag of the traversed documents.
    pub doc_type: String,
    /// Optional query filter (Elasticsearch DSL). Defaults to `match_all`.
    #[serde(default)]
    pub query: Option<serde_json::Value>,
    /// Documents per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Scroll keep-alive, renewed on every page (e.g. `5m`).
    #[serde(default = "default_scroll")]
    pub scroll: String,
    /// Strategy applied to each document.
    pub strategy: StrategyConfig,
}

/// Strategy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StrategyConfig {
    /// Structured version and dependency key on project requests.
    Project(ProjectConfig),
    /// Dependency key only.
    Dependencies(DependenciesConfig),
    /// Major/minor/release-train annotation of each stat.
    StatVersions,
    /// Generation totals plus per-bucket fan-out.
    DownloadGenerations(DownloadGenerationsConfig),
    /// One flat document per stat.
    DownloadFlatten(DownloadFlattenConfig),
}

/// Run options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillOptions {
    /// Dry run mode (transform and count, never write).
    #[serde(default)]
    pub dry_run: bool,
}

fn default_page_size() -> usize {
    2000
}

fn default_scroll() -> String {
    "5m".to_string()
}

/// Returns `true` for Elasticsearch time units such as `30s`, `5m` or `500ms`.
fn is_valid_keep_alive(value: &str) -> bool {
    let unit_start = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(unit_start);
    !amount.is_empty() && matches!(unit, "d" | "h" | "m" | "s" | "ms" | "micros" | "nanos")
}

impl BackfillConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_url(&self.backend.url)?;
        if self.jobs.is_empty() {
            return Err(crate::error::Error::Config(
                "at least one job is required".to_string(),
            ));
        }
        for (position, job) in self.jobs.iter().enumerate() {
            job.validate()
                .map_err(|reason| crate::error::Error::Config(format!("job {position}: {reason}")))?;
        }
        Ok(())
    }
}

impl JobConfig {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.index.is_empty() {
            return Err("index cannot be empty".to_string());
        }
        if self.doc_type.is_empty() {
            return Err("doc_type cannot be empty".to_string());
        }
        if self.page_size == 0 {
            return Err("page_size must be greater than 0".to_string());
        }
        if !is_valid_keep_alive(&self.scroll) {
            return Err(format!("invalid scroll keep-alive '{}'", self.scroll));
        }
        Ok(())
    }
}

//! Download statistics: generation totals and denormalized fan-out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::{module_identity, MigrationStrategy};
use crate::aggregation::{aggregate, read_stats, GenerationCount};
use crate::document::{Document, WriteAction};
use crate::error::TransformError;
use crate::version::classify;

/// Field marking a document whose generation totals were written.
pub const TOTAL_COUNT_FIELD: &str = "totalCount";

/// Configuration of the `download-generations` strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadGenerationsConfig {
    /// Index receiving one document per major bucket.
    #[serde(default = "default_major_index")]
    pub major_index: String,
    /// Index receiving one document per minor bucket.
    #[serde(default = "default_minor_index")]
    pub minor_index: String,
    /// Type tag of the fan-out documents.
    #[serde(default = "default_generation_type")]
    pub doc_type: String,
}

impl Default for DownloadGenerationsConfig {
    fn default() -> Self {
        Self {
            major_index: default_major_index(),
            minor_index: default_minor_index(),
            doc_type: default_generation_type(),
        }
    }
}

fn default_major_index() -> String {
    "downloads-major".to_string()
}

fn default_minor_index() -> String {
    "downloads-minor".to_string()
}

fn default_generation_type() -> String {
    "generation".to_string()
}

/// Writes `totalCount`, `majorGenerations` and `minorGenerations` on download
/// documents and fans each bucket out to the generation indices.
///
/// The update is only emitted once per document. The fan-out documents are
/// always produced: they land in separate indices that are rebuilt from
/// scratch.
pub struct DownloadGenerationStrategy {
    config: DownloadGenerationsConfig,
}

impl DownloadGenerationStrategy {
    /// Creates the strategy.
    pub fn new(config: DownloadGenerationsConfig) -> Self {
        Self { config }
    }

    fn fan_out(
        &self,
        index: &str,
        identity: &Map<String, Value>,
        buckets: &[GenerationCount],
    ) -> Vec<WriteAction> {
        buckets
            .iter()
            .map(|bucket| {
                let mut doc = identity.clone();
                doc.insert("generation".to_string(), Value::String(bucket.name.clone()));
                doc.insert("count".to_string(), Value::from(bucket.count));
                WriteAction::insert(index, &self.config.doc_type, doc)
            })
            .collect()
    }
}

fn buckets_json(buckets: &[GenerationCount]) -> Value {
    Value::Array(
        buckets
            .iter()
            .map(|bucket| {
                let mut entry = Map::new();
                entry.insert("name".to_string(), Value::String(bucket.name.clone()));
                entry.insert("count".to_string(), Value::from(bucket.count));
                Value::Object(entry)
            })
            .collect(),
    )
}

impl MigrationStrategy for DownloadGenerationStrategy {
    fn name(&self) -> &'static str {
        "download-generations"
    }

    fn transform(&self, document: &Document) -> Result<Vec<WriteAction>, TransformError> {
        let stats = read_stats(&document.source)?;
        let result = aggregate(&stats)?;
        let major = result.major_buckets();
        let minor = result.minor_buckets();

        let mut actions = Vec::with_capacity(1 + major.len() + minor.len());
        if !document.has(TOTAL_COUNT_FIELD) {
            let mut doc = Map::new();
            doc.insert(TOTAL_COUNT_FIELD.to_string(), Value::from(result.total_count));
            doc.insert("majorGenerations".to_string(), buckets_json(&major));
            doc.insert("minorGenerations".to_string(), buckets_json(&minor));
            actions.push(WriteAction::update(document, doc));
        }

        let identity = module_identity(document);
        actions.extend(self.fan_out(&self.config.major_index, &identity, &major));
        actions.extend(self.fan_out(&self.config.minor_index, &identity, &minor));
        Ok(actions)
    }
}

/// Configuration of the `download-flatten` strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadFlattenConfig {
    /// Index receiving one document per stat.
    #[serde(default = "default_flat_index")]
    pub index: String,
    /// Type tag of the flat documents.
    #[serde(default = "default_flat_type")]
    pub doc_type: String,
}

impl Default for DownloadFlattenConfig {
    fn default() -> Self {
        Self {
            index: default_flat_index(),
            doc_type: default_flat_type(),
        }
    }
}

fn default_flat_index() -> String {
    "downloads".to_string()
}

fn default_flat_type() -> String {
    "download".to_string()
}

/// Denormalizes each stat of a download document into its own document.
pub struct DownloadFlattenStrategy {
    config: DownloadFlattenConfig,
}

impl DownloadFlattenStrategy {
    /// Creates the strategy.
    pub fn new(config: DownloadFlattenConfig) -> Self {
        Self { config }
    }
}

impl MigrationStrategy for DownloadFlattenStrategy {
    fn name(&self) -> &'static str {
        "download-flatten"
    }

    fn transform(&self, document: &Document) -> Result<Vec<WriteAction>, TransformError> {
        let stats = read_stats(&document.source)?;
        let identity = module_identity(document);

        Ok(stats
            .into_iter()
            .map(|stat| {
                let reference = classify(&stat.version);
                if !reference.is_classified() {
                    warn!(
                        version = %reference.id,
                        count = stat.count,
                        "Download will have no generation information"
                    );
                }
                let mut doc = identity.clone();
                if let Some(source) = stat.source {
                    doc.insert("source".to_string(), Value::String(source));
                }
                doc.insert("count".to_string(), Value::from(stat.count));
                doc.insert("version".to_string(), reference.to_json());
                WriteAction::insert(&self.config.index, &self.config.doc_type, doc)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::document;
    use serde_json::json;

    fn module(stats: Value) -> Document {
        document(json!({
            "projectId": "spring-boot",
            "groupId": "org.springframework.boot",
            "artifactId": "spring-boot",
            "from": 1_500_000_000_000_i64,
            "to": 1_502_000_000_000_i64,
            "stats": stats
        }))
    }

    fn inserts_into<'a>(actions: &'a [WriteAction], target: &str) -> Vec<&'a Map<String, Value>> {
        actions
            .iter()
            .filter_map(|action| match action {
                WriteAction::Insert { index, doc, .. } if index == target => Some(doc),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_generations_update() {
        let doc = module(json!([
            {"version": "1.0.0.RELEASE", "count": 10},
            {"version": "1.0.1.RELEASE", "count": 40}
        ]));
        let strategy = DownloadGenerationStrategy::new(DownloadGenerationsConfig::default());
        let actions = strategy.transform(&doc).unwrap();

        match &actions[0] {
            WriteAction::Update { doc, .. } => {
                assert_eq!(doc["totalCount"], 50);
                assert_eq!(doc["majorGenerations"], json!([{"name": "1", "count": 50}]));
                assert_eq!(doc["minorGenerations"], json!([{"name": "1.0", "count": 50}]));
            }
            other => panic!("expected an update first, got {other:?}"),
        }
        assert_eq!(actions.len(), 3);
    }

    #[test]
    fn test_generations_fan_out() {
        let doc = module(json!([
            {"version": "Codd-SR2", "count": 50},
            {"version": "Dijkstra-RELEASE", "count": 200},
            {"version": "Dijkstra-SR1", "count": 100},
            {"version": "1.3.0.RELEASE", "count": 50},
            {"version": "1.4.6.RELEASE", "count": 150}
        ]));
        let strategy = DownloadGenerationStrategy::new(DownloadGenerationsConfig::default());
        let actions = strategy.transform(&doc).unwrap();

        let majors = inserts_into(&actions, "downloads-major");
        assert_eq!(majors.len(), 1);
        assert_eq!(majors[0]["generation"], "1");
        assert_eq!(majors[0]["count"], 200);
        assert_eq!(majors[0]["groupId"], "org.springframework.boot");

        let minors = inserts_into(&actions, "downloads-minor");
        let names: Vec<_> = minors.iter().map(|d| d["generation"].clone()).collect();
        assert_eq!(names, vec![json!("1.3"), json!("1.4"), json!("Codd"), json!("Dijkstra")]);
        assert_eq!(minors[3]["count"], 300);
    }

    #[test]
    fn test_generations_update_once_fan_out_always() {
        let mut doc = module(json!([{"version": "2.0.0", "count": 3}]));
        let strategy = DownloadGenerationStrategy::new(DownloadGenerationsConfig::default());
        let first = strategy.transform(&doc).unwrap();
        if let WriteAction::Update { doc: patch, .. } = &first[0] {
            doc.merge(patch);
        }

        let second = strategy.transform(&doc).unwrap();
        assert!(second.iter().all(|action| !action.is_update()));
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_generations_bad_stat_fails() {
        let doc = module(json!([{"version": "2.0.0"}]));
        let strategy = DownloadGenerationStrategy::new(DownloadGenerationsConfig::default());
        assert_eq!(
            strategy.transform(&doc).unwrap_err(),
            TransformError::MissingField("stats[0].count".to_string())
        );
    }

    #[test]
    fn test_flatten_non_standard() {
        let doc = module(json!([
            {"version": "4.1.6.RELEASE", "count": 20, "source": "central"},
            {"version": "2.0-m1", "count": 50, "source": "central"},
            {"version": "${spring.version}", "count": 5, "source": "central"},
            {"version": "", "count": 5, "source": "central"},
            {"version": "3..0.RELEASE", "count": 5, "source": "central"}
        ]));
        let strategy = DownloadFlattenStrategy::new(DownloadFlattenConfig::default());
        let actions = strategy.transform(&doc).unwrap();
        let flat = inserts_into(&actions, "downloads");

        assert_eq!(flat.len(), 5);
        assert_eq!(flat[0]["version"], json!({"id": "4.1.6.RELEASE", "major": "4", "minor": "4.1"}));
        assert_eq!(flat[1]["version"], json!({"id": "2.0-m1", "major": "2", "minor": "2.0"}));
        assert_eq!(flat[2]["version"], json!({"id": "${spring.version}"}));
        assert_eq!(flat[3]["version"], json!({"id": ""}));
        assert_eq!(flat[4]["version"], json!({"id": "3..0.RELEASE"}));
        assert_eq!(flat[0]["projectId"], "spring-boot");
        assert_eq!(flat[0]["from"], 1_500_000_000_000_i64);
        assert_eq!(flat[0]["source"], "central");
        assert_eq!(flat[1]["count"], 50);
    }

    #[test]
    fn test_flatten_type_tag() {
        let doc = module(json!([{"version": "1.0.0", "count": 1}]));
        let strategy = DownloadFlattenStrategy::new(DownloadFlattenConfig::default());
        match &strategy.transform(&doc).unwrap()[0] {
            WriteAction::Insert { doc_type, .. } => assert_eq!(doc_type, "download"),
            other => panic!("expected an insert, got {other:?}"),
        }
    }

    #[test]
    fn test_generations_count_overflow_fails_document() {
        let doc = module(json!([
            {"version": "1.0.0.RELEASE", "count": u64::MAX},
            {"version": "1.0.1.RELEASE", "count": 1}
        ]));
        let strategy = DownloadGenerationStrategy::new(DownloadGenerationsConfig::default());

        let err = strategy.transform(&doc).unwrap_err();

        assert!(matches!(err, TransformError::InvalidField { ref field, .. } if field == "stats[1].count"));
    }
}

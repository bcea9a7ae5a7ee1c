//! Download count aggregation by version generation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::TransformError;
use crate::version::{classify, VersionReference};

/// A per-version usage statistic embedded in a document's `stats` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    /// Raw version string.
    pub version: String,
    /// Number of downloads for that version.
    pub count: u64,
    /// Where the statistic came from, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl StatRecord {
    /// Reads the stat at `position` of a document's `stats` list.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] if `version` is not a string or `count`
    /// is not a non-negative integer.
    pub fn from_value(position: usize, value: &Value) -> Result<Self, TransformError> {
        let field = |name: &str| format!("stats[{position}].{name}");
        let object = value
            .as_object()
            .ok_or_else(|| TransformError::invalid(format!("stats[{position}]"), "an object"))?;
        let version = object
            .get("version")
            .ok_or_else(|| TransformError::MissingField(field("version")))?
            .as_str()
            .ok_or_else(|| TransformError::invalid(field("version"), "a string"))?
            .to_string();
        let count = object
            .get("count")
            .ok_or_else(|| TransformError::MissingField(field("count")))?
            .as_u64()
            .ok_or_else(|| TransformError::invalid(field("count"), "a non-negative integer"))?;
        let source = object
            .get("source")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            version,
            count,
            source,
        })
    }
}

/// Reads every stat of a document payload. A missing `stats` field is an
/// empty list.
///
/// # Errors
///
/// Returns the first malformed stat.
pub fn read_stats(source: &Map<String, Value>) -> Result<Vec<StatRecord>, TransformError> {
    match source.get("stats") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(position, item)| StatRecord::from_value(position, item))
            .collect(),
        Some(_) => Err(TransformError::invalid("stats", "an array")),
    }
}

/// One generation bucket as written to the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCount {
    /// Bucket key (`"1"`, `"1.2"`, `"Dalston"`).
    pub name: String,
    /// Summed download count.
    pub count: u64,
}

/// Totals of a document's stats, grouped by major and minor generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationResult {
    /// Sum of every stat count, classified or not.
    pub total_count: u64,
    /// Counts per major bucket, ordered by key.
    pub major_generations: BTreeMap<String, u64>,
    /// Counts per minor bucket, ordered by key.
    pub minor_generations: BTreeMap<String, u64>,
}

impl AggregationResult {
    /// Adds one stat.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] and leaves the totals untouched if a sum
    /// would overflow.
    pub fn add(&mut self, reference: &VersionReference, count: u64) -> Result<(), TransformError> {
        let overflow = || TransformError::invalid("count", COUNT_SUM_EXPECTED);
        let total = self.total_count.checked_add(count).ok_or_else(overflow)?;
        let major = bucket_sum(&self.major_generations, reference.major.as_deref(), count)
            .ok_or_else(overflow)?;
        let minor = bucket_sum(&self.minor_generations, reference.minor.as_deref(), count)
            .ok_or_else(overflow)?;

        self.total_count = total;
        if let (Some(name), Some(sum)) = (&reference.major, major) {
            self.major_generations.insert(name.clone(), sum);
        }
        if let (Some(name), Some(sum)) = (&reference.minor, minor) {
            self.minor_generations.insert(name.clone(), sum);
        }
        Ok(())
    }

    /// Major buckets in lexicographic order.
    #[must_use]
    pub fn major_buckets(&self) -> Vec<GenerationCount> {
        buckets(&self.major_generations)
    }

    /// Minor buckets in lexicographic order.
    #[must_use]
    pub fn minor_buckets(&self) -> Vec<GenerationCount> {
        buckets(&self.minor_generations)
    }
}

const COUNT_SUM_EXPECTED: &str = "a count whose sum fits in 64 bits";

/// New value of bucket `name` after adding `count`. `Some(None)` when there
/// is no bucket to update, `None` on overflow.
fn bucket_sum(map: &BTreeMap<String, u64>, name: Option<&str>, count: u64) -> Option<Option<u64>> {
    match name {
        None => Some(None),
        Some(name) => map
            .get(name)
            .copied()
            .unwrap_or(0)
            .checked_add(count)
            .map(Some),
    }
}

fn buckets(map: &BTreeMap<String, u64>) -> Vec<GenerationCount> {
    map.iter()
        .map(|(name, count)| GenerationCount {
            name: name.clone(),
            count: *count,
        })
        .collect()
}

/// Aggregates stats into total, major and minor counts.
///
/// Stats whose version cannot be classified only count toward the total.
///
/// # Errors
///
/// Returns a [`TransformError`] naming the first stat whose count makes a
/// sum overflow.
pub fn aggregate(stats: &[StatRecord]) -> Result<AggregationResult, TransformError> {
    let mut result = AggregationResult::default();
    for (position, stat) in stats.iter().enumerate() {
        let reference = classify(&stat.version);
        if !reference.is_classified() {
            warn!(
                version = %reference.id,
                count = stat.count,
                "Stat has no generation information"
            );
        }
        result.add(&reference, stat.count).map_err(|_| {
            TransformError::invalid(format!("stats[{position}].count"), COUNT_SUM_EXPECTED)
        })?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stat(version: &str, count: u64) -> StatRecord {
        StatRecord {
            version: version.to_string(),
            count,
            source: None,
        }
    }

    #[test]
    fn test_aggregate_same_minor() {
        let result = aggregate(&[stat("1.0.0.RELEASE", 10), stat("1.0.1.RELEASE", 40)]).unwrap();

        assert_eq!(result.total_count, 50);
        assert_eq!(result.major_generations, BTreeMap::from([("1".to_string(), 50)]));
        assert_eq!(
            result.minor_generations,
            BTreeMap::from([("1.0".to_string(), 50)])
        );
    }

    #[test]
    fn test_aggregate_release_trains_only_fill_minor() {
        let result = aggregate(&[
            stat("Dijkstra-RELEASE", 200),
            stat("Dijkstra-SR1", 100),
            stat("1.4.6.RELEASE", 150),
        ])
        .unwrap();

        assert_eq!(result.total_count, 450);
        assert_eq!(result.major_generations.len(), 1);
        assert_eq!(result.major_generations["1"], 150);
        assert_eq!(result.minor_generations["Dijkstra"], 300);
        assert_eq!(result.minor_generations["1.4"], 150);
    }

    #[test]
    fn test_aggregate_unclassified_counts_toward_total_only() {
        let result =
            aggregate(&[stat("${spring.version}", 5), stat("", 5), stat("2.5.6", 5)]).unwrap();

        assert_eq!(result.total_count, 15);
        assert_eq!(result.major_generations["2"], 5);
        assert_eq!(result.minor_generations.len(), 1);
    }

    #[test]
    fn test_aggregate_order_independent() {
        let forward = aggregate(&[stat("1.0.0", 1), stat("2.0.0", 2), stat("Codd-SR2", 3)]);
        let backward = aggregate(&[stat("Codd-SR2", 3), stat("2.0.0", 2), stat("1.0.0", 1)]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_buckets_are_sorted() {
        let result = aggregate(&[stat("2.0.0", 1), stat("10.0.0", 1), stat("1.5.0", 1)]).unwrap();
        let names: Vec<_> = result.major_buckets().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["1", "10", "2"]);
    }

    #[test]
    fn test_read_stats() {
        let source = json!({"stats": [
            {"version": "1.0.0", "count": 3, "source": "central"},
            {"version": "Codd-SR2", "count": 7}
        ]});
        let stats = read_stats(source.as_object().unwrap()).unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].source.as_deref(), Some("central"));
        assert_eq!(stats[1].count, 7);
    }

    #[test]
    fn test_read_stats_missing_is_empty() {
        let source = json!({"groupId": "org.example"});
        assert!(read_stats(source.as_object().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_read_stats_missing_count_fails() {
        let source = json!({"stats": [{"version": "1.0.0", "count": 1}, {"version": "1.0.1"}]});
        let err = read_stats(source.as_object().unwrap()).unwrap_err();
        assert_eq!(err, TransformError::MissingField("stats[1].count".to_string()));
    }

    #[test]
    fn test_read_stats_non_numeric_count_fails() {
        let source = json!({"stats": [{"version": "1.0.0", "count": "many"}]});
        let err = read_stats(source.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, TransformError::InvalidField { .. }));
    }

    #[test]
    fn test_aggregate_overflow_fails_document() {
        // Arrange
        let stats = [stat("1.0.0.RELEASE", u64::MAX), stat("1.0.1.RELEASE", 1)];

        // Act
        let err = aggregate(&stats).unwrap_err();

        // Assert
        assert_eq!(
            err,
            TransformError::InvalidField {
                field: "stats[1].count".to_string(),
                expected: COUNT_SUM_EXPECTED,
            }
        );
    }

    #[test]
    fn test_add_overflow_leaves_totals_untouched() {
        let mut result = AggregationResult::default();
        result.add(&classify("Dalston.SR1"), 5).unwrap();
        result.add(&classify("1.0.0"), u64::MAX - 5).unwrap();

        assert!(result.add(&classify("1.0.1"), 1).is_err());
        assert_eq!(result.total_count, u64::MAX);
        assert_eq!(result.major_generations["1"], u64::MAX - 5);
        assert_eq!(result.minor_generations["1.0"], u64::MAX - 5);
        assert_eq!(result.minor_generations["Dalston"], 5);
    }
}

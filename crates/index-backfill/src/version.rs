//! Version string classification.
//!
//! Download statistics and project documents carry free-form version strings:
//! standard releases (`1.2.3.RELEASE`), named release trains (`Dalston.SR4`),
//! legacy two-part versions (`2.0-m1`) and plain garbage (`${spring.version}`).
//! [`classify`] maps any of them to a [`VersionReference`] holding the
//! generation buckets used for aggregation.
//!
//! The grammar is an ordered list of independent matchers; the first match
//! wins. A numeric-leading string can never be a release train because train
//! names are letters only.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `MAJOR.MINOR.PATCH[(.|-)QUALIFIER[DIGITS]]` or a bare `MAJOR.MINOR`.
static STANDARD_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)\.([0-9]+|x)(?:\.([0-9]+|x)(?:[.-]([^0-9]+)([0-9]+)?)?)?$")
        .expect("standard version regex is valid")
});

/// `NAME(_|-|.)QUALIFIER`, NAME letters only.
static RELEASE_TRAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]+)[_.-]([A-Za-z0-9_-]*)$").expect("release train regex is valid")
});

/// `MAJOR.(MINOR|x)[(.|-)QUALIFIER[DIGITS]]`.
static LEGACY_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+)\.([0-9]+|x)(?:[.-]([^0-9]+)([0-9]+)?)?$").expect("legacy version regex is valid")
});

/// A version string together with its major and minor generation buckets.
///
/// Both buckets are `None` when the version could not be classified. For a
/// release train, `major` is `None` and `minor` holds the train name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionReference {
    /// Cleaned version text.
    pub id: String,
    /// Major bucket, e.g. `"2"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    /// Minor bucket, e.g. `"2.1"` or a release train name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minor: Option<String>,
}

impl VersionReference {
    /// Creates a reference from its parts.
    pub fn new(id: impl Into<String>, major: Option<String>, minor: Option<String>) -> Self {
        Self {
            id: id.into(),
            major,
            minor,
        }
    }

    /// JSON object `{id, major?, minor?}` as stored in documents.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(major) = &self.major {
            object.insert("major".to_string(), Value::String(major.clone()));
        }
        if let Some(minor) = &self.minor {
            object.insert("minor".to_string(), Value::String(minor.clone()));
        }
        Value::Object(object)
    }

    /// Returns `true` if at least one generation bucket is known.
    #[must_use]
    pub fn is_classified(&self) -> bool {
        self.major.is_some() || self.minor.is_some()
    }
}

/// A named release train such as `Ingalls-SR5-1` or `Dalston.SR4`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTrain {
    /// Train name (`Ingalls`).
    pub name: String,
    /// Everything after the separator (`SR5-1`).
    pub qualifier: String,
}

impl ReleaseTrain {
    /// Parses `text` as a release train, or returns `None`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let caps = RELEASE_TRAIN.captures(text.trim())?;
        Some(Self {
            name: caps[1].to_string(),
            qualifier: caps[2].to_string(),
        })
    }
}

type Matcher = fn(&str) -> Option<VersionReference>;

/// Matchers in priority order.
const MATCHERS: [Matcher; 3] = [match_standard, match_release_train, match_legacy];

/// Classifies a raw version string. Never fails.
///
/// Unclassifiable input yields a reference whose `id` is the cleaned text and
/// whose buckets are both `None`.
#[must_use]
pub fn classify(text: &str) -> VersionReference {
    let cleaned = clean_version(text);
    MATCHERS
        .iter()
        .find_map(|matcher| matcher(&cleaned))
        .unwrap_or_else(|| VersionReference::new(cleaned, None, None))
}

/// Percent-decodes `text` and keeps only what follows the last `?`.
///
/// A string that cannot be decoded is used as is.
#[must_use]
pub fn clean_version(text: &str) -> String {
    let decoded = percent_decode(text).unwrap_or_else(|| text.to_string());
    match decoded.rsplit_once('?') {
        Some((_, tail)) => tail.to_string(),
        None => decoded,
    }
}

/// Form-style percent decoding: `%XX` escapes and `+` as a space.
fn percent_decode(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                if !hex.iter().all(u8::is_ascii_hexdigit) {
                    return None;
                }
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

fn match_standard(text: &str) -> Option<VersionReference> {
    let caps = STANDARD_VERSION.captures(text.trim())?;
    Some(from_numeric(text, &caps))
}

fn match_release_train(text: &str) -> Option<VersionReference> {
    let train = ReleaseTrain::parse(text)?;
    Some(VersionReference::new(text, None, Some(train.name)))
}

fn match_legacy(text: &str) -> Option<VersionReference> {
    let caps = LEGACY_VERSION.captures(text.trim())?;
    Some(from_numeric(text, &caps))
}

/// Builds buckets from captures where group 1 is MAJOR and group 2 is MINOR.
///
/// A wildcard minor (`x`) only yields a major bucket.
fn from_numeric(id: &str, caps: &Captures<'_>) -> VersionReference {
    let major = normalize_number(&caps[1]);
    let minor = match &caps[2] {
        "x" => None,
        minor => Some(format!("{}.{}", major, normalize_number(minor))),
    };
    VersionReference::new(id, Some(major), minor)
}

/// Drops leading zeros so `01` and `1` land in the same bucket.
fn normalize_number(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;

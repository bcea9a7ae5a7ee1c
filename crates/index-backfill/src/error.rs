//! Error types for index-backfill.
//!
//! [`Error`] covers run-level failures. [`TransformError`] is the
//! per-document failure a strategy reports; the pipeline logs and counts it
//! without stopping the page.

use std::fmt;

use thiserror::Error;

/// Result type alias for backfill operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of a run at which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    /// The initial paginated search.
    Search,
    /// Fetching the next page with a scroll id.
    Scroll,
    /// Submitting a page's bulk write.
    BulkSubmit,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Search => "initial search",
            Self::Scroll => "scroll",
            Self::BulkSubmit => "bulk submission",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while running a backfill.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend rejected the credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The backend asked us to slow down (retry after N seconds).
    #[error("Rate limited, retry after {0}s")]
    RateLimit(u64),

    /// The backend answered with an unexpected status or payload.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A run aborted at a fatal stage.
    #[error("Run aborted during {stage}: {source}")]
    Aborted {
        /// Stage that failed.
        stage: RunStage,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A single document could not be transformed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps this error as a fatal failure of `stage`.
    #[must_use]
    pub fn at(self, stage: RunStage) -> Self {
        Self::Aborted {
            stage,
            source: Box::new(self),
        }
    }

    /// Returns the fatal stage if this error aborted a run.
    #[must_use]
    pub fn stage(&self) -> Option<RunStage> {
        match self {
            Self::Aborted { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Per-document failure raised by a migration strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// A field is present but has the wrong shape.
    #[error("field '{field}' is not {expected}")]
    InvalidField {
        /// Field path.
        field: String,
        /// Expected shape, e.g. "a string".
        expected: &'static str,
    },
}

impl TransformError {
    pub(crate) fn invalid(field: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidField {
            field: field.into(),
            expected,
        }
    }
}

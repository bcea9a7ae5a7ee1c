// Backfill tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # index-backfill
//!
//! `index-backfill` walks every document of a search index with a scroll
//! cursor, computes derived fields with a migration strategy and writes them
//! back with batched bulk requests.
//!
//! ## Strategies
//!
//! | Strategy | Reads | Writes |
//! |----------|-------|--------|
//! | `project` | `bootVersion`, `dependencies` | `version`, `dependenciesId` |
//! | `dependencies` | `dependencies` | `dependenciesId` |
//! | `stat-versions` | `stats[].version` | `stats[].versionMajor/versionMinor/releaseTrain` |
//! | `download-generations` | `stats` | totals plus one document per generation |
//! | `download-flatten` | `stats` | one document per stat |
//!
//! ## Quick Start
//!
//! ```bash
//! index-backfill run --config backfill.yaml
//!
//! # Dry run (transform and count only)
//! index-backfill run --config backfill.yaml --dry-run
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! backend:
//!   url: http://localhost:9200
//!
//! jobs:
//!   - index: initializr-2015
//!     doc_type: request
//!     page_size: 2000
//!     scroll: 5m
//!     strategy:
//!       type: project
//! ```

#![warn(missing_docs)]

pub mod aggregation;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod strategy;
pub mod version;

pub use aggregation::{aggregate, AggregationResult, GenerationCount, StatRecord};
pub use config::{BackfillConfig, BackfillOptions, JobConfig, StrategyConfig};
pub use document::{Document, DocumentRef, WriteAction};
pub use error::{Error, Result, RunStage, TransformError};
pub use pipeline::{Pipeline, RunStats};
pub use store::elasticsearch::{ElasticsearchConfig, ElasticsearchStore};
pub use store::memory::MemoryStore;
pub use store::DocumentStore;
pub use strategy::{create_strategy, MigrationStrategy};
pub use version::{classify, clean_version, ReleaseTrain, VersionReference};

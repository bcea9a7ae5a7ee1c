//! Scroll-cursor bulk pipeline.
//!
//! One run walks every document matched by a job's query, one page at a time,
//! and writes each page's actions with a single bulk call before fetching the
//! next page. Per-document and per-item failures are logged and counted; only
//! the initial search, a scroll fetch or a bulk submission can abort a run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::JobConfig;
use crate::document::{Document, WriteAction};
use crate::error::{Error, Result, RunStage};
use crate::store::{DocumentStore, SearchRequest};
use crate::strategy::{create_strategy, MigrationStrategy};

/// Run statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    /// Non-empty pages processed.
    pub pages: u64,
    /// Documents read.
    pub hits: u64,
    /// Documents whose transformation failed.
    pub documents_failed: u64,
    /// Update actions submitted (or counted in dry-run mode).
    pub updates: u64,
    /// Insert actions submitted (or counted in dry-run mode).
    pub inserts: u64,
    /// Bulk items rejected by the backend.
    pub items_failed: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl RunStats {
    /// Calculate throughput (documents per second).
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.hits as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    /// Total actions produced.
    #[must_use]
    pub fn actions(&self) -> u64 {
        self.updates + self.inserts
    }
}

/// Backfill pipeline over one document store.
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    dry_run: bool,
    show_progress: bool,
}

impl Pipeline {
    /// Create a pipeline writing to `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            dry_run: false,
            show_progress: false,
        }
    }

    /// Transform and count without writing.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Show a progress spinner on stderr.
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run a job with the strategy named in its configuration.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub async fn run_job(&self, job: &JobConfig) -> Result<RunStats> {
        let strategy = create_strategy(&job.strategy);
        self.run(job, strategy.as_ref()).await
    }

    /// Run `strategy` over every document matched by `job`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] if the initial search, a scroll fetch or a
    /// bulk submission fails. Pages written before the failure stay written.
    pub async fn run(&self, job: &JobConfig, strategy: &dyn MigrationStrategy) -> Result<RunStats> {
        let start = Instant::now();
        let mut stats = RunStats::default();

        info!(
            "Starting {} backfill on {} {}/{} ({} per page{})",
            strategy.name(),
            self.store.backend_type(),
            job.index,
            job.doc_type,
            job.page_size,
            if self.dry_run { ", dry run" } else { "" }
        );

        let request = SearchRequest::in_index_order(
            &job.index,
            &job.doc_type,
            job.query.clone(),
            job.page_size,
            &job.scroll,
        );
        let mut page = self
            .store
            .search(&request)
            .await
            .map_err(|e| e.at(RunStage::Search))?;
        let mut scroll_id = page.scroll_id.take();

        let progress = create_progress_bar(self.show_progress);

        let outcome = loop {
            if page.hits.is_empty() {
                break Ok(());
            }
            stats.pages += 1;
            stats.hits += page.hits.len() as u64;

            let actions = transform_page(&page.hits, strategy, &mut stats);
            if let Err(e) = self.submit(&actions, &mut stats).await {
                break Err(e.at(RunStage::BulkSubmit));
            }

            progress.inc(page.hits.len() as u64);
            info!(
                "Page {}: {} documents, {} actions ({} documents so far)",
                stats.pages,
                page.hits.len(),
                actions.len(),
                stats.hits
            );

            let Some(id) = scroll_id.as_deref() else {
                break Err(Error::Backend("search response carried no scroll id".to_string())
                    .at(RunStage::Scroll));
            };
            match self.store.scroll(id, &job.scroll).await {
                Ok(mut next) => {
                    if let Some(next_id) = next.scroll_id.take() {
                        scroll_id = Some(next_id);
                    }
                    page = next;
                }
                Err(e) => break Err(e.at(RunStage::Scroll)),
            }
        };

        if let Some(id) = scroll_id {
            if let Err(e) = self.store.clear_scroll(&id).await {
                warn!("Failed to release scroll context: {}", e);
            }
        }

        stats.duration_secs = start.elapsed().as_secs_f64();
        match outcome {
            Ok(()) => {
                progress.finish_with_message("Backfill complete");
                info!(
                    "Backfill complete: {} pages, {} documents ({} failed), {} updates, {} inserts ({} rejected) in {:.2}s ({:.0} docs/sec)",
                    stats.pages,
                    stats.hits,
                    stats.documents_failed,
                    stats.updates,
                    stats.inserts,
                    stats.items_failed,
                    stats.duration_secs,
                    stats.throughput()
                );
                Ok(stats)
            }
            Err(e) => {
                progress.abandon_with_message("Backfill aborted");
                error!(
                    "Backfill aborted after {} pages ({} documents): {}",
                    stats.pages, stats.hits, e
                );
                Err(e)
            }
        }
    }

    async fn submit(&self, actions: &[WriteAction], stats: &mut RunStats) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let updates = actions.iter().filter(|a| a.is_update()).count() as u64;
        stats.updates += updates;
        stats.inserts += actions.len() as u64 - updates;

        if self.dry_run {
            debug!("Dry run: skipping bulk write of {} actions", actions.len());
            return Ok(());
        }

        let response = self.store.bulk(actions).await?;
        for item in response.failures() {
            stats.items_failed += 1;
            error!(
                "Bulk {} failed on {}/{}: status {} {}",
                item.action,
                item.index,
                item.id.as_deref().unwrap_or("-"),
                item.status,
                item.error.as_deref().unwrap_or("")
            );
        }
        Ok(())
    }
}

/// Transforms every hit of a page, isolating per-document failures.
fn transform_page(
    hits: &[Value],
    strategy: &dyn MigrationStrategy,
    stats: &mut RunStats,
) -> Vec<WriteAction> {
    let mut actions = Vec::new();
    for hit in hits {
        let result = Document::from_hit(hit).and_then(|document| strategy.transform(&document));
        match result {
            Ok(produced) => actions.extend(produced),
            Err(e) => {
                stats.documents_failed += 1;
                let index = hit.get("_index").and_then(Value::as_str).unwrap_or("-");
                let id = hit.get("_id").and_then(Value::as_str).unwrap_or("-");
                error!("Failed to transform {}/{}: {}", index, id, e);
            }
        }
    }
    actions
}

fn create_progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} documents ({per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

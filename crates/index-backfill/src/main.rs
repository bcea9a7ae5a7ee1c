//! index-backfill CLI
//!
//! Runs migration strategies over search index documents.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use index_backfill::{classify, create_strategy, BackfillConfig, ElasticsearchStore, Pipeline, RunStats};

#[derive(Parser)]
#[command(name = "index-backfill")]
#[command(version)]
#[command(about = "Backfill computed fields on search index documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "BACKFILL_CONFIG")]
    config: Option<PathBuf>,

    /// Dry run mode (transform and count, never write)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Page size override for every job
    #[arg(long, global = true, env = "BACKFILL_PAGE_SIZE")]
    page_size: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every job of a config file
    Run {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Generate example configuration
    Init {
        /// Strategy (project, dependencies, stat-versions, download-generations, download-flatten)
        #[arg(short, long)]
        strategy: String,

        /// Output file path
        #[arg(short, long, default_value = "backfill.yaml")]
        output: PathBuf,
    },

    /// Classify version strings and print their generation buckets
    Classify {
        /// Version strings
        #[arg(required = true)]
        versions: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Some(Commands::Run { config }) => {
            run_backfill(&config, cli.dry_run, cli.page_size).await?;
        }
        Some(Commands::Validate { config }) => {
            validate_config(&config)?;
        }
        Some(Commands::Init { strategy, output }) => {
            generate_config(&strategy, &output)?;
        }
        Some(Commands::Classify { versions }) => {
            classify_versions(&versions)?;
        }
        None => {
            // Default: run if config provided
            if let Some(config) = cli.config {
                run_backfill(&config, cli.dry_run, cli.page_size).await?;
            } else {
                eprintln!("Usage: index-backfill --config <FILE> or index-backfill <COMMAND>");
                eprintln!("Try 'index-backfill --help' for more information.");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn run_backfill(
    config_path: &Path,
    dry_run: bool,
    page_size: Option<usize>,
) -> anyhow::Result<()> {
    info!("Loading configuration from {:?}", config_path);

    let mut config = BackfillConfig::from_file(config_path)?;

    if dry_run {
        config.options.dry_run = true;
    }

    if let Some(size) = page_size {
        for job in &mut config.jobs {
            job.page_size = size;
        }
    }

    config.validate()?;

    let store = Arc::new(ElasticsearchStore::new(config.backend.clone()));
    let pipeline = Pipeline::new(store)
        .dry_run(config.options.dry_run)
        .with_progress(true);

    let mut total = RunStats::default();
    for (position, job) in config.jobs.iter().enumerate() {
        info!(
            "Job {}/{}: {} on {}/{}",
            position + 1,
            config.jobs.len(),
            create_strategy(&job.strategy).name(),
            job.index,
            job.doc_type
        );
        let stats = pipeline.run_job(job).await.inspect_err(|e| {
            error!("Job {} failed: {}", position + 1, e);
        })?;
        total.pages += stats.pages;
        total.hits += stats.hits;
        total.documents_failed += stats.documents_failed;
        total.updates += stats.updates;
        total.inserts += stats.inserts;
        total.items_failed += stats.items_failed;
        total.duration_secs += stats.duration_secs;
    }

    println!("\nBackfill complete{}", if config.options.dry_run { " (dry run)" } else { "" });
    println!("   Jobs:       {}", config.jobs.len());
    println!("   Pages:      {}", total.pages);
    println!("   Documents:  {} ({} failed)", total.hits, total.documents_failed);
    println!("   Updates:    {}", total.updates);
    println!("   Inserts:    {}", total.inserts);
    println!("   Rejected:   {}", total.items_failed);
    println!("   Duration:   {:.2}s", total.duration_secs);
    println!("   Throughput: {:.0} docs/sec", total.throughput());

    Ok(())
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let config = BackfillConfig::from_file(config_path)?;
    config.validate()?;

    println!("Configuration is valid!");
    println!("   Backend: {}", config.backend.url);
    for job in &config.jobs {
        println!(
            "   Job:     {} on {}/{} ({} per page, scroll {})",
            create_strategy(&job.strategy).name(),
            job.index,
            job.doc_type,
            job.page_size,
            job.scroll
        );
    }

    Ok(())
}

fn generate_config(strategy: &str, output: &Path) -> anyhow::Result<()> {
    let (index, doc_type, block) = match strategy.to_lowercase().as_str() {
        "project" => ("initializr-2015", "request", PROJECT_STRATEGY),
        "dependencies" => ("initializr-2015", "request", DEPENDENCIES_STRATEGY),
        "stat-versions" => ("downloads", "download", STAT_VERSIONS_STRATEGY),
        "download-generations" => ("downloads", "download", DOWNLOAD_GENERATIONS_STRATEGY),
        "download-flatten" => ("downloads", "download", DOWNLOAD_FLATTEN_STRATEGY),
        _ => {
            error!("Unknown strategy: {}", strategy);
            eprintln!("Supported strategies: project, dependencies, stat-versions, download-generations, download-flatten");
            std::process::exit(1);
        }
    };

    let template = format!(
        "# index-backfill configuration - {strategy} strategy\n{CONFIG_HEADER}  - index: {index}\n    doc_type: {doc_type}\n    page_size: 2000\n    scroll: 5m\n    strategy:\n{block}{CONFIG_FOOTER}"
    );
    std::fs::write(output, template)?;
    println!("Generated configuration: {:?}", output);
    println!("   Edit the file and run: index-backfill run --config {:?}", output);

    Ok(())
}

fn classify_versions(versions: &[String]) -> anyhow::Result<()> {
    for version in versions {
        let reference = classify(version);
        println!("{}", serde_json::to_string(&reference)?);
    }
    Ok(())
}

const CONFIG_HEADER: &str = r#"backend:
  url: http://localhost:9200
  # username: elastic
  # password: changeme
  # api_key: your-api-key
  timeout_secs: 30
  search_retries: 3

jobs:
"#;

const CONFIG_FOOTER: &str = r#"
options:
  dry_run: false
"#;

const PROJECT_STRATEGY: &str = r#"      type: project
      version_source: bootVersion
      dependencies_field: dependencies
"#;

const DEPENDENCIES_STRATEGY: &str = r#"      type: dependencies
      dependencies_field: dependencies
"#;

const STAT_VERSIONS_STRATEGY: &str = r#"      type: stat-versions
"#;

const DOWNLOAD_GENERATIONS_STRATEGY: &str = r#"      type: download-generations
      major_index: downloads-major
      minor_index: downloads-minor
      doc_type: generation
"#;

const DOWNLOAD_FLATTEN_STRATEGY: &str = r#"      type: download-flatten
      index: downloads-flat
      doc_type: download
"#;

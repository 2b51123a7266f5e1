//! Partition-Crawler main entry point
//!
//! This is the command-line interface for the resumable partitioned crawler.

use clap::Parser;
use partition_crawler::config::{load_config_with_hash, validate, Config};
use partition_crawler::crawler::{planner, Coordinator};
use partition_crawler::output::{print_status, print_summary, CheckpointStatus, ConsoleReporter};
use partition_crawler::storage::{open_batch_sink, FileCheckpointStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Partition-Crawler: a resumable, rate-adaptive crawler
///
/// Partition-Crawler splits a search space into facet and price-range
/// partitions, walks each partition's paginated listing, and checkpoints
/// progress so an interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "partition-crawler")]
#[command(version)]
#[command(about = "A resumable, rate-adaptive partitioned crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Discard checkpoint markers and start from the first partition
    #[arg(long)]
    fresh: bool,

    /// Validate config and show the planned partitions without crawling
    #[arg(long, conflicts_with_all = ["status", "fresh"])]
    dry_run: bool,

    /// Show checkpoint progress and exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The spinner only runs during a crawl; logs are routed around it
    let console = (!cli.quiet && !cli.dry_run && !cli.status).then(ConsoleReporter::new);
    setup_logging(cli.verbose, cli.quiet, console.as_ref());

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.status {
        handle_status(&config)?;
    } else {
        handle_crawl(config, cli.fresh, console).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, console: Option<&ConsoleReporter>) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("partition_crawler=info,warn"),
            1 => EnvFilter::new("partition_crawler=debug,info"),
            2 => EnvFilter::new("partition_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    match console {
        Some(reporter) => subscriber.with_writer(reporter.log_writer()).init(),
        None => subscriber.init(),
    }
}

/// Handles the --dry-run mode: validates config and lists the partitions
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    validate(config)?;
    let partitions = planner::plan_from_config(&config.partitions)?;

    println!("=== Partition-Crawler Dry Run ===\n");

    println!("Pacing:");
    println!("  Minimum delay: {}ms", config.crawler.min_delay_ms);
    println!("  Jitter: ±{}ms", config.crawler.jitter_ms);
    println!("  Page cap: {}", config.crawler.page_cap);
    println!("  Flush threshold: {}", config.crawler.flush_threshold);

    println!("\nSite:");
    println!("  Base URL: {}", config.site.base_url);
    println!("  Listing: {}", config.site.listing_path);

    println!("\nOutput:");
    println!("  State directory: {}", config.output.state_dir);
    println!("  Batch format: {:?}", config.output.format);

    // Only read markers that already exist; a dry run creates nothing
    let state_dir = Path::new(&config.output.state_dir);
    let completed = if state_dir.is_dir() {
        FileCheckpointStore::open(state_dir)?.checkpoint()?.completed
    } else {
        Default::default()
    };
    let remaining = planner::filter_completed(&partitions, &completed);

    println!("\nPartitions ({}, {} remaining):", partitions.len(), remaining.len());
    for partition in &partitions {
        let marker = if completed.contains(partition) { "✓" } else { "-" };
        println!("  {} {}", marker, partition);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --status mode: reports checkpoint progress
fn handle_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    validate(config)?;
    let partitions = planner::plan_from_config(&config.partitions)?;

    let store = FileCheckpointStore::open(Path::new(&config.output.state_dir))?;
    let checkpoint = store.checkpoint()?;
    let sink = open_batch_sink(&config.output)?;

    let status = CheckpointStatus {
        planned: partitions.len(),
        completed: partitions
            .iter()
            .filter(|p| checkpoint.completed.contains(p))
            .count(),
        cursor: checkpoint.resumable_cursor().cloned(),
        batches: sink.batch_names()?.len(),
    };
    print_status(&status);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    fresh: bool,
    console: Option<ConsoleReporter>,
) -> Result<(), Box<dyn std::error::Error>> {
    if fresh {
        tracing::info!("Starting fresh crawl (discarding checkpoint markers)");
    } else {
        tracing::info!("Starting crawl (will resume if an interrupted run exists)");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing the current item");
            on_signal.cancel();
        }
    });

    let mut coordinator = Coordinator::new(config, fresh)?;
    if let Some(reporter) = console {
        coordinator = coordinator.with_reporter(Arc::new(reporter));
    }

    match coordinator.run(&cancel).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}

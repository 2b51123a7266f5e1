//! Run summaries and checkpoint status reporting
//!
//! This module provides the summary returned by a crawl run and the
//! checkpoint status shown by the binary's `--status` mode.

use crate::state::{CooldownCounts, PageCursor, Partition};
use std::time::Duration;

/// Summary of one crawl run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Partitions in the planned space
    pub partitions_total: usize,

    /// Partitions skipped because a previous run completed them
    pub partitions_skipped: usize,

    /// Partitions completed by this run
    pub partitions_completed: usize,

    /// Partitions whose attempt was aborted, with the reason
    pub partitions_failed: Vec<(Partition, String)>,

    /// Records written to durable batches
    pub records_collected: usize,

    /// Item stubs processed, whatever their outcome
    pub items_seen: u64,

    /// Items left out of the buffer by the completeness policy
    pub items_excluded: u64,

    /// Items abandoned after a fetch failure
    pub items_failed: u64,

    /// Listing pages skipped after exhausting retries
    pub pages_skipped: u64,

    pub cooldowns: CooldownCounts,

    /// Responses with a throttling status (429 or 503)
    pub throttles: u64,

    pub batches_written: usize,

    /// The run stopped on an operator request
    pub cancelled: bool,

    pub elapsed: Duration,
}

impl RunSummary {
    /// Transient and extraction problems encountered, all recovered
    pub fn errors_encountered(&self) -> u64 {
        self.items_excluded + self.items_failed + self.pages_skipped
    }

    /// Partitions still pending after this run
    pub fn partitions_remaining(&self) -> usize {
        self.partitions_total
            .saturating_sub(self.partitions_skipped + self.partitions_completed)
    }
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Partitions:");
    println!("  Planned: {}", summary.partitions_total);
    println!("  Already complete: {}", summary.partitions_skipped);
    println!("  Completed this run: {}", summary.partitions_completed);
    println!("  Remaining: {}", summary.partitions_remaining());
    println!();

    println!("Items:");
    println!("  Seen: {}", summary.items_seen);
    println!("  Records collected: {}", summary.records_collected);
    println!("  Excluded (incomplete): {}", summary.items_excluded);
    println!("  Failed (network): {}", summary.items_failed);
    println!("  Batches written: {}", summary.batches_written);
    println!();

    if summary.cooldowns.total() > 0 || summary.errors_encountered() > 0 {
        println!("Recovered errors ({}):", summary.errors_encountered());
        println!("  Timeouts: {}", summary.cooldowns.timeout);
        println!("  Connection failures: {}", summary.cooldowns.connection);
        println!("  Throttled responses: {}", summary.throttles);
        println!("  Slowdown cooldowns: {}", summary.cooldowns.slowdown);
        println!("  Listing pages skipped: {}", summary.pages_skipped);
        println!();
    }

    if !summary.partitions_failed.is_empty() {
        println!("Failed partitions ({}):", summary.partitions_failed.len());
        for (partition, reason) in &summary.partitions_failed {
            println!("  - {}: {}", partition, reason);
        }
        println!();
    }

    if summary.cancelled {
        println!("Run cancelled; progress saved for resumption.");
    }

    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
}

/// Checkpoint progress against a planned partition space
#[derive(Debug, Clone)]
pub struct CheckpointStatus {
    pub planned: usize,
    pub completed: usize,
    pub cursor: Option<PageCursor>,
    pub batches: usize,
}

/// Prints checkpoint status to stdout
pub fn print_status(status: &CheckpointStatus) {
    println!("=== Checkpoint Status ===\n");

    let percentage = if status.planned > 0 {
        (status.completed as f64 / status.planned as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Partitions complete: {} / {} ({:.1}%)",
        status.completed, status.planned, percentage
    );
    println!("Durable batches: {}", status.batches);

    match &status.cursor {
        Some(cursor) => {
            let last = cursor
                .last_page
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!(
                "In progress: {} at page {}/{} item {} ({} items seen)",
                cursor.partition, cursor.page, last, cursor.next_item, cursor.items_seen
            );
        }
        None => println!("In progress: none"),
    }
}

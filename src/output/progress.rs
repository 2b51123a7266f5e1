//! Progress reporting for crawl runs
//!
//! The coordinator emits [`CrawlEvent`]s to a [`CrawlReporter`]. The library
//! default logs them through `tracing`; the binary uses [`ConsoleReporter`]
//! for a live spinner.

use crate::state::Partition;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Events emitted by the coordinator and walker
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    RunStarted {
        planned: usize,
        remaining: usize,
    },
    PartitionStarted {
        partition: &'a Partition,
        page: u32,
    },
    PageCompleted {
        partition: &'a Partition,
        page: u32,
        last_page: Option<u32>,
        records: usize,
        excluded: u64,
    },
    ItemFailed {
        partition: &'a Partition,
        page: u32,
        item: usize,
        error: &'a str,
    },
    BatchFlushed {
        name: &'a str,
        records: usize,
    },
    PartitionCompleted {
        partition: &'a Partition,
        records: usize,
    },
    PartitionFailed {
        partition: &'a Partition,
        error: &'a str,
    },
    Cancelled {
        partition: &'a Partition,
        page: u32,
    },
    RunFinished {
        completed: usize,
        records: usize,
    },
}

/// Receiver for crawl events
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl CrawlReporter for TracingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::RunStarted { planned, remaining } => {
                tracing::info!(planned, remaining, "Crawl run started");
            }
            CrawlEvent::PartitionStarted { partition, page } => {
                tracing::info!(%partition, page, "Partition started");
            }
            CrawlEvent::PageCompleted {
                partition,
                page,
                last_page,
                records,
                excluded,
            } => {
                tracing::info!(
                    %partition,
                    page,
                    last_page = ?last_page,
                    records,
                    excluded,
                    "Page completed"
                );
            }
            CrawlEvent::ItemFailed {
                partition,
                page,
                item,
                error,
            } => {
                tracing::warn!(%partition, page, item, error, "Item failed");
            }
            CrawlEvent::BatchFlushed { name, records } => {
                tracing::info!(name, records, "Batch flushed");
            }
            CrawlEvent::PartitionCompleted { partition, records } => {
                tracing::info!(%partition, records, "Partition completed");
            }
            CrawlEvent::PartitionFailed { partition, error } => {
                tracing::error!(%partition, error, "Partition attempt aborted");
            }
            CrawlEvent::Cancelled { partition, page } => {
                tracing::warn!(%partition, page, "Crawl cancelled; progress saved");
            }
            CrawlEvent::RunFinished { completed, records } => {
                tracing::info!(completed, records, "Crawl run finished");
            }
        }
    }
}

/// Live terminal indicator backed by an `indicatif` spinner
pub struct ConsoleReporter {
    bar: ProgressBar,
    records: AtomicU64,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            records: AtomicU64::new(0),
        }
    }
}

impl ConsoleReporter {
    /// Writer factory for `tracing-subscriber` that keeps log lines off the spinner
    pub fn log_writer(&self) -> impl Fn() -> SpinnerWriter + Send + Sync + 'static {
        let bar = self.bar.clone();
        move || SpinnerWriter { bar: bar.clone() }
    }
}

/// Writes to stderr with the spinner cleared for the duration of the write
pub struct SpinnerWriter {
    bar: ProgressBar,
}

impl Write for SpinnerWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bar.suspend(|| io::stderr().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.bar.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlReporter for ConsoleReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::PageCompleted {
                partition,
                page,
                last_page,
                records,
                ..
            } => {
                let total = self.records.fetch_add(records as u64, Ordering::Relaxed) + records as u64;
                let last = last_page
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "?".to_string());
                self.bar.set_message(format!(
                    "Total records {} || {} page {}/{}",
                    total, partition, page, last
                ));
            }
            CrawlEvent::ItemFailed {
                page, item, error, ..
            } => {
                self.bar
                    .println(format!("Item failed on page {} item {}: {}", page, item, error));
            }
            CrawlEvent::PartitionFailed { partition, error } => {
                self.bar
                    .println(format!("Partition {} aborted: {}", partition, error));
            }
            CrawlEvent::RunFinished { .. } => {
                self.bar.finish_and_clear();
            }
            other => TracingReporter.report(other),
        }
    }
}

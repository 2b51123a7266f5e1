//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Planning the partition space and skipping completed partitions
//! - Resuming the interrupted partition from its page cursor
//! - Driving the page walker through each partition's phases
//! - Flushing record batches before committing a partition
//! - Handling cancellation and reporting a run summary

use crate::config::{validate, Config};
use crate::crawler::client::SiteClient;
use crate::crawler::fetcher::HttpSiteClient;
use crate::crawler::planner;
use crate::crawler::rate::RateController;
use crate::crawler::walker::{Discovery, PageOutcome, PageWalker, WalkSettings};
use crate::output::{CrawlEvent, CrawlReporter, RecordBuffer, RunSummary, TracingReporter};
use crate::state::{Checkpoint, PageCursor, Partition, PartitionPhase};
use crate::storage::{
    open_batch_sink, BatchReceipt, BatchSink, CheckpointStore, DiagnosticsLog,
    FileCheckpointStore, RecordBatch,
};
use crate::{CrawlError, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Name of the diagnostics log inside the state directory
pub const DIAGNOSTICS_FILE: &str = "diagnostics.csv";

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    walker: PageWalker,
    checkpoints: Box<dyn CheckpointStore>,
    sink: Box<dyn BatchSink>,
    reporter: Arc<dyn CrawlReporter>,
    summary: RunSummary,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `fresh` - Whether to discard existing checkpoint markers first
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - Invalid configuration or unusable output paths
    pub fn new(config: Config, fresh: bool) -> Result<Self> {
        validate(&config)?;

        let state_dir = Path::new(&config.output.state_dir);
        let mut checkpoints = FileCheckpointStore::open(state_dir)?;
        if fresh {
            checkpoints.reset()?;
        }

        let sink = open_batch_sink(&config.output)?;
        let diagnostics = DiagnosticsLog::open(&state_dir.join(DIAGNOSTICS_FILE))?;
        let client = HttpSiteClient::new(&config)?;

        let mut coordinator =
            Self::with_parts(config, Arc::new(client), Box::new(checkpoints), sink);
        coordinator.walker = coordinator.walker.with_diagnostics(diagnostics);
        Ok(coordinator)
    }

    /// Assembles a coordinator from explicit collaborators
    pub fn with_parts(
        config: Config,
        client: Arc<dyn SiteClient>,
        checkpoints: Box<dyn CheckpointStore>,
        sink: Box<dyn BatchSink>,
    ) -> Self {
        let reporter: Arc<dyn CrawlReporter> = Arc::new(TracingReporter);
        let walker = PageWalker::new(
            client,
            RateController::new(&config.crawler),
            WalkSettings::from_config(&config),
            Arc::clone(&reporter),
        );

        Self {
            config,
            walker,
            checkpoints,
            sink,
            reporter,
            summary: RunSummary::default(),
        }
    }

    /// Replaces the progress reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn CrawlReporter>) -> Self {
        self.walker.set_reporter(Arc::clone(&reporter));
        self.reporter = reporter;
        self
    }

    /// Runs every pending partition until done or cancelled
    ///
    /// Transient network and extraction problems are absorbed and counted.
    /// A partition whose first listing cannot be fetched is recorded as
    /// failed and the run moves on. Checkpoint and batch write failures
    /// abort the run.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<RunSummary> {
        let start_time = Instant::now();
        self.summary = RunSummary::default();

        let partitions = planner::plan_from_config(&self.config.partitions)?;
        let fingerprint = planner::fingerprint(&partitions);
        if let Some(previous) = self.checkpoints.swap_partition_fingerprint(&fingerprint)? {
            if previous != fingerprint {
                tracing::warn!(
                    "Partition space changed since the previous run; completed markers are still honored"
                );
            }
        }

        let checkpoint = Checkpoint {
            completed: self.checkpoints.load_completed_partitions()?,
            cursor: self.checkpoints.load_page_cursor()?,
        };
        let resume = checkpoint
            .resumable_cursor()
            .filter(|cursor| partitions.contains(&cursor.partition))
            .cloned();

        let remaining = planner::filter_completed(&partitions, &checkpoint.completed);
        let ordered = planner::resume_first(remaining, resume.as_ref().map(|c| &c.partition));

        self.summary.partitions_total = partitions.len();
        self.summary.partitions_skipped = partitions.len() - ordered.len();
        self.reporter.report(CrawlEvent::RunStarted {
            planned: partitions.len(),
            remaining: ordered.len(),
        });
        if let Some(cursor) = &resume {
            tracing::info!(
                "Resuming {} at page {} item {}",
                cursor.partition,
                cursor.page,
                cursor.next_item
            );
        }

        for partition in ordered {
            if cancel.is_cancelled() {
                self.summary.cancelled = true;
                break;
            }

            let cursor = match &resume {
                Some(cursor) if cursor.partition == partition => {
                    let durable = self.durable_through(&partition)?;
                    cursor.clone().resumed().catch_up(durable)
                }
                _ => PageCursor::start(partition),
            };

            match self.run_partition(cursor, cancel).await? {
                PartitionPhase::Done => self.summary.partitions_completed += 1,
                PartitionPhase::Cancelled => {
                    self.summary.cancelled = true;
                    break;
                }
                _ => {}
            }
        }

        let stats = self.walker.stats();
        self.summary.items_seen = stats.items_seen;
        self.summary.items_excluded = stats.items_excluded;
        self.summary.items_failed = stats.items_failed;
        self.summary.pages_skipped = stats.pages_skipped;
        self.summary.throttles = stats.throttles;
        self.summary.cooldowns = self.walker.rate().state().cooldowns;
        self.summary.elapsed = start_time.elapsed();

        self.reporter.report(CrawlEvent::RunFinished {
            completed: self.summary.partitions_completed,
            records: self.summary.records_collected,
        });

        Ok(self.summary.clone())
    }

    /// Drives one partition through its phases
    ///
    /// Returns the terminal phase reached.
    async fn run_partition(
        &mut self,
        mut cursor: PageCursor,
        cancel: &CancellationToken,
    ) -> Result<PartitionPhase> {
        let partition = cursor.partition.clone();
        let mut buffer = RecordBuffer::new(partition.clone(), cursor.flushed_through);
        let mut phase = PartitionPhase::Start;
        let mut prefetched = None;

        let result = loop {
            match phase {
                PartitionPhase::Start => {
                    self.reporter.report(CrawlEvent::PartitionStarted {
                        partition: &partition,
                        page: cursor.page,
                    });
                    self.checkpoints.record_page_progress(&cursor)?;
                    transition(&mut phase, PartitionPhase::DiscoverPageCount)?;
                }

                PartitionPhase::DiscoverPageCount => {
                    match self.walker.discover(&mut cursor, cancel).await {
                        Ok(Discovery::Known) => {}
                        Ok(Discovery::Fetched(listing)) => {
                            prefetched = Some(listing);
                            self.checkpoints.record_page_progress(&cursor)?;
                        }
                        Ok(Discovery::Cancelled) => {
                            // Discovery never buffers records, so nothing needs flushing
                            transition(&mut phase, PartitionPhase::Cancelled)?;
                            continue;
                        }
                        Err(error) => {
                            let reason = format!("page count discovery failed: {}", error);
                            self.reporter.report(CrawlEvent::PartitionFailed {
                                partition: &partition,
                                error: &reason,
                            });
                            self.summary.partitions_failed.push((partition.clone(), reason));
                            transition(&mut phase, PartitionPhase::Failed)?;
                            continue;
                        }
                    }
                    transition(&mut phase, PartitionPhase::WalkPages)?;
                }

                PartitionPhase::WalkPages => {
                    if self.walker.is_exhausted(&cursor) {
                        tracing::debug!("{} exhausted at page {}", partition, cursor.page);
                        transition(&mut phase, PartitionPhase::FlushAndCommit)?;
                        continue;
                    }
                    if cancel.is_cancelled() {
                        self.interrupt(&mut cursor, &mut buffer)?;
                        transition(&mut phase, PartitionPhase::Cancelled)?;
                        continue;
                    }

                    match self.walker.walk_page(&mut cursor, prefetched.take(), cancel).await {
                        PageOutcome::Completed { records } => {
                            buffer.extend(records);
                            if let Some(receipt) = buffer.flush_if_threshold(
                                self.config.crawler.flush_threshold,
                                cursor.items_seen,
                                self.sink.as_mut(),
                            )? {
                                self.report_batch(&receipt);
                            }
                            cursor.flushed_through = buffer.flushed_through();
                            self.checkpoints.record_page_progress(&cursor)?;
                            transition(&mut phase, PartitionPhase::WalkPages)?;
                        }
                        PageOutcome::Skipped { .. } => {
                            self.checkpoints.record_page_progress(&cursor)?;
                            transition(&mut phase, PartitionPhase::WalkPages)?;
                        }
                        PageOutcome::Empty => {
                            transition(&mut phase, PartitionPhase::FlushAndCommit)?;
                        }
                        PageOutcome::Interrupted { records } => {
                            buffer.extend(records);
                            self.interrupt(&mut cursor, &mut buffer)?;
                            transition(&mut phase, PartitionPhase::Cancelled)?;
                        }
                    }
                }

                PartitionPhase::FlushAndCommit => {
                    // Flush strictly before the completion marker
                    if let Some(receipt) =
                        buffer.force_flush(cursor.items_seen, self.sink.as_mut())?
                    {
                        self.report_batch(&receipt);
                    }
                    self.checkpoints.record_partition_complete(&partition)?;
                    self.checkpoints.clear_page_cursor()?;

                    self.reporter.report(CrawlEvent::PartitionCompleted {
                        partition: &partition,
                        records: buffer.records_flushed(),
                    });
                    transition(&mut phase, PartitionPhase::Done)?;
                }

                PartitionPhase::Cancelled => {
                    self.reporter.report(CrawlEvent::Cancelled {
                        partition: &partition,
                        page: cursor.page,
                    });
                    break PartitionPhase::Cancelled;
                }

                PartitionPhase::Done | PartitionPhase::Failed => break phase,
            }
        };

        self.summary.records_collected += buffer.records_flushed();
        self.summary.batches_written += buffer.batches_written();
        Ok(result)
    }

    /// Flushes what was collected and stores the exact resume position
    fn interrupt(&mut self, cursor: &mut PageCursor, buffer: &mut RecordBuffer) -> Result<()> {
        if let Some(receipt) = buffer.force_flush(cursor.items_seen, self.sink.as_mut())? {
            self.report_batch(&receipt);
        }
        cursor.flushed_through = buffer.flushed_through();
        self.checkpoints.record_page_progress(cursor)?;
        Ok(())
    }

    /// Highest item counter covered by a batch already written for `partition`
    fn durable_through(&self, partition: &Partition) -> Result<u64> {
        Ok(self
            .sink
            .batch_names()?
            .iter()
            .filter_map(|name| RecordBatch::parse_range(partition, name))
            .map(|(_, last)| last)
            .max()
            .unwrap_or(0))
    }

    fn report_batch(&self, receipt: &BatchReceipt) {
        self.reporter.report(CrawlEvent::BatchFlushed {
            name: &receipt.name,
            records: receipt.records,
        });
    }

    /// Partitions still pending according to the checkpoint
    pub fn pending_partitions(&self) -> Result<Vec<Partition>> {
        let partitions = planner::plan_from_config(&self.config.partitions)?;
        let completed = self.checkpoints.load_completed_partitions()?;
        Ok(planner::filter_completed(&partitions, &completed))
    }
}

/// Moves `phase` to `next`, rejecting edges the state machine does not allow
fn transition(phase: &mut PartitionPhase, next: PartitionPhase) -> Result<()> {
    if !phase.can_transition_to(next) {
        return Err(CrawlError::InvalidTransition {
            from: *phase,
            to: next,
        });
    }
    tracing::trace!("Partition phase {} -> {}", phase, next);
    *phase = next;
    Ok(())
}

/// Runs a complete crawl with a fresh cancellation token
pub async fn run_crawl(config: Config, fresh: bool, cancel: CancellationToken) -> Result<RunSummary> {
    let mut coordinator = Coordinator::new(config, fresh)?;
    coordinator.run(&cancel).await
}

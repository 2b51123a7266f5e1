//! Crawler module for partitioned, paced crawling
//!
//! This module contains the core crawling logic, including:
//! - Partition planning and resumption ordering
//! - Listing pagination and per-item extraction
//! - Adaptive request pacing and cooldowns
//! - Overall crawl coordination

mod client;
mod coordinator;
mod fetcher;
mod parser;
pub mod planner;
mod rate;
mod walker;

pub use client::{
    DetailPage, FailureKind, FetchError, FetchResult, ItemStub, ListingPage, SiteClient,
};
pub use coordinator::{run_crawl, Coordinator, DIAGNOSTICS_FILE};
pub use fetcher::{build_http_client, HttpSiteClient};
pub use parser::{
    item_id_from_link, parse_last_page, parse_price, CompletenessPolicy, ExtractionError,
    ListingParser, StructuredRecord,
};
pub use planner::RangeSpec;
pub use rate::RateController;
pub use walker::{Discovery, PageOutcome, PageWalker, WalkSettings, WalkStats};

use crate::config::Config;
use crate::output::RunSummary;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Validate the configuration
/// 2. Open the checkpoint markers and the batch sink
/// 3. Plan partitions and skip those already complete
/// 4. Walk every pending partition, flushing and committing each
/// 5. Return a summary of the run
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(RunSummary)` - Crawl finished (possibly with failed partitions)
/// * `Err(CrawlError)` - Configuration or durability failure
pub async fn run(config: Config) -> Result<RunSummary> {
    run_with_cancel(config, CancellationToken::new()).await
}

/// Runs a crawl that stops cleanly once `cancel` fires
///
/// Cancellation is observed at page and item boundaries. The buffer is
/// flushed and the page cursor saved before returning.
pub async fn run_with_cancel(config: Config, cancel: CancellationToken) -> Result<RunSummary> {
    run_crawl(config, false, cancel).await
}

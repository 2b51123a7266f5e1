//! Pagination within one partition
//!
//! The walker pulls one listing page at a time, fetches and extracts every
//! item on it, and moves the [`PageCursor`] forward. Transient failures are
//! absorbed here: they cost a cooldown and a diagnostics line, never the
//! page or the partition.

use crate::config::Config;
use crate::crawler::client::{FailureKind, FetchError, FetchResult, ItemStub, ListingPage, SiteClient};
use crate::crawler::parser::{parse_price, CompletenessPolicy, ExtractionError, StructuredRecord};
use crate::crawler::rate::RateController;
use crate::output::{CrawlEvent, CrawlReporter, ItemRecord, SpecsStatus};
use crate::state::{CooldownKind, PageCursor, Partition};
use crate::storage::DiagnosticsLog;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Work bounds and completeness rules for a walk
#[derive(Debug, Clone)]
pub struct WalkSettings {
    pub page_cap: u32,
    pub max_images: usize,
    pub listing_retries: u32,
    pub policy: CompletenessPolicy,
}

impl WalkSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_cap: config.crawler.page_cap,
            max_images: config.crawler.max_images,
            listing_retries: config.crawler.listing_retries,
            policy: CompletenessPolicy::from(&config.extraction),
        }
    }
}

/// Counters accumulated across every walk of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub items_seen: u64,
    pub items_excluded: u64,
    pub items_failed: u64,
    pub pages_skipped: u64,
    pub throttles: u64,
}

/// Result of discovering a partition's page count
#[derive(Debug)]
pub enum Discovery {
    /// The cursor already knew its last page; nothing was fetched
    Known,
    /// The first listing was fetched; it is handed to the first `walk_page`
    Fetched(ListingPage),
    Cancelled,
}

/// Result of walking one listing page
#[derive(Debug)]
pub enum PageOutcome {
    /// Every stub on the page was processed and the cursor moved on
    Completed { records: Vec<ItemRecord> },
    /// The page listed no items; the partition is exhausted
    Empty,
    /// The listing could not be fetched after retries; the cursor moved on
    Skipped { error: FetchError },
    /// Cancellation was observed at an item boundary; the cursor points at
    /// the first unprocessed stub
    Interrupted { records: Vec<ItemRecord> },
}

enum ItemOutcome {
    Record(ItemRecord),
    Excluded(ExtractionError),
}

/// Page walker shared by every partition of a run
pub struct PageWalker {
    client: Arc<dyn SiteClient>,
    rate: RateController,
    diagnostics: Option<DiagnosticsLog>,
    reporter: Arc<dyn CrawlReporter>,
    settings: WalkSettings,
    stats: WalkStats,
}

impl PageWalker {
    pub fn new(
        client: Arc<dyn SiteClient>,
        rate: RateController,
        settings: WalkSettings,
        reporter: Arc<dyn CrawlReporter>,
    ) -> Self {
        Self {
            client,
            rate,
            diagnostics: None,
            reporter,
            settings,
            stats: WalkStats::default(),
        }
    }

    /// Attaches the diagnostics log that receives one line per failure
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsLog) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn set_reporter(&mut self, reporter: Arc<dyn CrawlReporter>) {
        self.reporter = reporter;
    }

    pub fn stats(&self) -> WalkStats {
        self.stats
    }

    pub fn rate(&self) -> &RateController {
        &self.rate
    }

    /// Returns true once the cursor is past its last page or the page cap
    pub fn is_exhausted(&self, cursor: &PageCursor) -> bool {
        cursor.is_exhausted(self.settings.page_cap)
    }

    /// Learns the partition's last page from its current listing page
    ///
    /// # Returns
    ///
    /// * `Ok(Discovery)` - The page count is known, fetched, or the run was cancelled
    /// * `Err(FetchError)` - The listing failed after every retry
    pub async fn discover(
        &mut self,
        cursor: &mut PageCursor,
        cancel: &CancellationToken,
    ) -> FetchResult<Discovery> {
        if cursor.last_page.is_some() {
            return Ok(Discovery::Known);
        }

        let partition = cursor.partition.clone();
        let Some(listing) = self.fetch_listing(&partition, cursor.page, cancel).await? else {
            return Ok(Discovery::Cancelled);
        };

        cursor.last_page = listing.last_page;
        match listing.last_page {
            Some(last) => tracing::info!("{} declares {} pages", partition, last),
            None => tracing::info!(
                "{} declares no page count; bounded by cap of {}",
                partition,
                self.settings.page_cap
            ),
        }
        Ok(Discovery::Fetched(listing))
    }

    /// Walks the page the cursor points at
    ///
    /// `prefetched` is the listing returned by [`PageWalker::discover`], used
    /// instead of fetching the same page again.
    pub async fn walk_page(
        &mut self,
        cursor: &mut PageCursor,
        prefetched: Option<ListingPage>,
        cancel: &CancellationToken,
    ) -> PageOutcome {
        let partition = cursor.partition.clone();
        let page = cursor.page;

        let listing = match prefetched {
            Some(listing) => listing,
            None => match self.fetch_listing(&partition, page, cancel).await {
                Ok(Some(listing)) => listing,
                Ok(None) => return PageOutcome::Interrupted { records: Vec::new() },
                Err(error) => {
                    tracing::warn!("Skipping page {} of {}: {}", page, partition, error);
                    self.stats.pages_skipped += 1;
                    cursor.advance_page();
                    return PageOutcome::Skipped { error };
                }
            },
        };

        if cursor.last_page.is_none() {
            cursor.last_page = listing.last_page;
        }

        if listing.stubs.is_empty() {
            tracing::info!("Page {} of {} lists no items", page, partition);
            return PageOutcome::Empty;
        }

        let mut records = Vec::new();
        let mut excluded = 0u64;

        for (index, stub) in listing.stubs.iter().enumerate().skip(cursor.next_item) {
            if !self.pace(cancel).await {
                return PageOutcome::Interrupted { records };
            }

            match self.fetch_item(stub).await {
                Ok(ItemOutcome::Record(record)) => records.push(record),
                Ok(ItemOutcome::Excluded(reason)) => {
                    tracing::info!("Item {} on page {} excluded: {}", stub.id, page, reason);
                    excluded += 1;
                    self.stats.items_excluded += 1;
                }
                Err(error) => {
                    self.stats.items_failed += 1;
                    self.note_failure(&error, &partition, page, Some(index));
                    self.reporter.report(CrawlEvent::ItemFailed {
                        partition: &partition,
                        page,
                        item: index,
                        error: &error.to_string(),
                    });
                    if let Some(kind) = error.cooldown() {
                        self.cooldown(kind, cancel).await;
                    }
                }
            }

            cursor.next_item = index + 1;
            cursor.items_seen += 1;
            self.stats.items_seen += 1;
        }

        self.reporter.report(CrawlEvent::PageCompleted {
            partition: &partition,
            page,
            last_page: cursor.last_page,
            records: records.len(),
            excluded,
        });

        cursor.advance_page();
        PageOutcome::Completed { records }
    }

    /// Fetches a listing page, retrying transient failures
    ///
    /// Returns `Ok(None)` if cancellation interrupted a wait.
    async fn fetch_listing(
        &mut self,
        partition: &Partition,
        page: u32,
        cancel: &CancellationToken,
    ) -> FetchResult<Option<ListingPage>> {
        let client = Arc::clone(&self.client);
        let mut attempt = 0u32;

        loop {
            if !self.pace(cancel).await {
                return Ok(None);
            }

            let start = Instant::now();
            let result = client.fetch_listing(partition, page).await;
            let elapsed = start.elapsed();

            let error = match result {
                Ok(listing) => {
                    self.rate.record_listing_latency(elapsed);
                    return Ok(Some(listing));
                }
                Err(error) => error,
            };

            self.rate.record_latency(elapsed);
            self.note_failure(&error, partition, page, None);

            if let Some(kind) = error.cooldown() {
                if !self.cooldown(kind, cancel).await {
                    return Ok(None);
                }
            }

            if !error.is_transient() || attempt >= self.settings.listing_retries {
                return Err(error);
            }
            attempt += 1;
            tracing::warn!(
                "Listing page {} of {} failed ({}); retry {}/{}",
                page,
                partition,
                error,
                attempt,
                self.settings.listing_retries
            );
        }
    }

    /// Fetches and extracts one item
    async fn fetch_item(&mut self, stub: &ItemStub) -> FetchResult<ItemOutcome> {
        let client = Arc::clone(&self.client);

        let Some((price, price_value)) = stub
            .price
            .as_ref()
            .and_then(|text| parse_price(text).map(|value| (text.clone(), value)))
        else {
            return Ok(ItemOutcome::Excluded(ExtractionError::MissingPrice));
        };

        let detail = self.timed(client.fetch_detail(stub)).await?;
        let Some(token) = detail.correlation_token else {
            return Ok(ItemOutcome::Excluded(ExtractionError::MissingToken));
        };

        let value = self.timed(client.fetch_record(stub, &token)).await?;
        let structured = match StructuredRecord::from_json(&value) {
            Ok(structured) => structured,
            Err(reason) => return Ok(ItemOutcome::Excluded(reason)),
        };
        if let Err(reason) = self.settings.policy.check(&structured) {
            return Ok(ItemOutcome::Excluded(reason));
        }

        let mut images = Vec::new();
        for url in structured.image_urls.iter().take(self.settings.max_images) {
            images.push(self.timed(client.fetch_image(url)).await?);
        }

        let specs = match &structured.derivative_id {
            Some(derivative_id) => {
                let value = self.timed(client.fetch_specs(derivative_id)).await?;
                SpecsStatus::Available(into_map(value))
            }
            None => {
                tracing::debug!("Item {} has no derivative id; specs unavailable", stub.id);
                SpecsStatus::Unavailable
            }
        };

        Ok(ItemOutcome::Record(ItemRecord {
            item_id: stub.id.clone(),
            price,
            price_value,
            description: structured.description,
            images,
            attributes: structured.vehicle,
            specs,
            session_id: token,
        }))
    }

    async fn timed<T>(&mut self, request: impl Future<Output = FetchResult<T>>) -> FetchResult<T> {
        let start = Instant::now();
        let result = request.await;
        self.rate.record_latency(start.elapsed());
        result
    }

    /// Paced wait before a request; false if cancelled first
    async fn pace(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.rate.wait_before_request() => true,
            _ = cancel.cancelled() => false,
        }
    }

    /// Cooldown after a failure; false if cancelled first
    async fn cooldown(&mut self, kind: CooldownKind, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = self.rate.cooldown(kind) => true,
            _ = cancel.cancelled() => false,
        }
    }

    fn note_failure(&mut self, error: &FetchError, partition: &Partition, page: u32, item: Option<usize>) {
        if error.kind() == FailureKind::Throttled {
            self.stats.throttles += 1;
        }

        // Item failures reach the log through the reporter's ItemFailed event
        if item.is_none() {
            tracing::warn!("Listing page {} of {} failed: {}", page, partition, error);
        }

        if let Some(diagnostics) = &self.diagnostics {
            if let Err(e) = diagnostics.record(error.label(), partition, page, item) {
                tracing::warn!("Failed to write diagnostics line: {}", e);
            }
        }
    }
}

/// Specification payloads that are not objects are kept under `value`
fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

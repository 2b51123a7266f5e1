//! In-memory collaborators shared by unit tests

use crate::config::{
    BatchFormat, Config, CrawlerConfig, ExtractionConfig, OutputConfig, PartitionConfig,
    SelectorConfig, SiteConfig,
};
use crate::crawler::{DetailPage, FetchError, FetchResult, ItemStub, ListingPage, SiteClient};
use crate::output::{ItemRecord, SpecsStatus};
use crate::state::{PageCursor, Partition};
use crate::storage::{
    BatchReceipt, BatchSink, CheckpointStore, RecordBatch, StorageError, StorageResult,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// A minimal complete record
pub fn record(id: &str) -> ItemRecord {
    let mut attributes = Map::new();
    attributes.insert("make".to_string(), json!("Volvo"));

    ItemRecord {
        item_id: id.to_string(),
        price: "£1,000".to_string(),
        price_value: 1000.0,
        description: format!("Item {}", id),
        images: vec![id.as_bytes().to_vec()],
        attributes,
        specs: SpecsStatus::Unavailable,
        session_id: format!("token-{}", id),
    }
}

/// A listed item with a price and a link carrying query parameters
pub fn stub(id: &str) -> ItemStub {
    ItemStub {
        id: id.to_string(),
        link: format!("/car-details/{}?sort=price-asc", id),
        price: Some("£1,000".to_string()),
    }
}

/// A valid configuration with short delays and a single partition
pub fn crawler_config() -> Config {
    Config {
        crawler: CrawlerConfig {
            min_delay_ms: 100,
            floor_delay_ms: 50,
            jitter_ms: 0,
            initial_latency_ms: 100,
            request_timeout_ms: 1000,
            page_cap: 100,
            max_images: 7,
            flush_threshold: 130,
            timeout_cooldown_ms: 4000,
            connection_cooldown_ms: 60000,
            slowdown_factor: 5.0,
            slowdown_cooldown_ms: 10000,
            listing_retries: 2,
        },
        site: SiteConfig {
            base_url: "https://www.example.com".to_string(),
            listing_path: "/car-search".to_string(),
            record_path: "/json/fpa/initial".to_string(),
            specs_path: "/car-specs".to_string(),
            user_agent: "partition-crawler-test".to_string(),
            page_param: "page".to_string(),
            derivative_param: "derivative".to_string(),
            listing_params: BTreeMap::new(),
            specs_params: BTreeMap::new(),
            selectors: SelectorConfig::default(),
        },
        partitions: PartitionConfig {
            facet_param: "body-type".to_string(),
            facet_values: vec!["SUV".to_string()],
            range_lower_param: "price-from".to_string(),
            range_upper_param: "price-to".to_string(),
            range_start: 0,
            range_end: 1000,
            range_step: 1000,
            range_upper_inclusive: true,
        },
        extraction: ExtractionConfig::default(),
        output: OutputConfig {
            state_dir: "state".to_string(),
            format: BatchFormat::Json,
            batch_dir: "batches".to_string(),
            database_path: String::new(),
        },
    }
}

/// Ordered log of writes shared between the memory store and sink
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
pub struct StoredBatch {
    pub name: String,
    pub first_item: u64,
    pub last_item: u64,
    pub records: Vec<ItemRecord>,
}

/// Batch sink keeping batches in memory
#[derive(Debug, Default)]
pub struct MemoryBatchSink {
    pub batches: Vec<StoredBatch>,
    pub fail_writes: bool,
    pub journal: Option<Journal>,
}

impl MemoryBatchSink {
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }
}

impl BatchSink for MemoryBatchSink {
    fn write_batch(&mut self, batch: &RecordBatch<'_>) -> StorageResult<BatchReceipt> {
        if self.fail_writes {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "batch write refused",
            )));
        }

        let name = batch.name();
        self.batches.retain(|b| b.name != name);
        self.batches.push(StoredBatch {
            name: name.clone(),
            first_item: batch.first_item,
            last_item: batch.last_item,
            records: batch.records.to_vec(),
        });
        if let Some(journal) = &self.journal {
            journal.push(format!("batch {}", name));
        }

        Ok(BatchReceipt {
            name,
            records: batch.records.len(),
            first_item: batch.first_item,
            last_item: batch.last_item,
        })
    }

    fn batch_names(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<_> = self.batches.iter().map(|b| b.name.clone()).collect();
        names.sort();
        Ok(names)
    }
}

impl BatchSink for Arc<Mutex<MemoryBatchSink>> {
    fn write_batch(&mut self, batch: &RecordBatch<'_>) -> StorageResult<BatchReceipt> {
        self.lock().unwrap().write_batch(batch)
    }

    fn batch_names(&self) -> StorageResult<Vec<String>> {
        self.lock().unwrap().batch_names()
    }
}

/// Checkpoint store keeping markers in memory
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    pub completed: BTreeSet<Partition>,
    pub cursor: Option<PageCursor>,
    pub fingerprint: Option<String>,
    pub journal: Option<Journal>,
}

impl MemoryCheckpointStore {
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    fn log(&self, entry: String) {
        if let Some(journal) = &self.journal {
            journal.push(entry);
        }
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load_completed_partitions(&self) -> StorageResult<BTreeSet<Partition>> {
        Ok(self.completed.clone())
    }

    fn load_page_cursor(&self) -> StorageResult<Option<PageCursor>> {
        Ok(self.cursor.clone())
    }

    fn record_partition_complete(&mut self, partition: &Partition) -> StorageResult<()> {
        self.completed.insert(partition.clone());
        self.log(format!("complete {}", partition.slug()));
        Ok(())
    }

    fn record_page_progress(&mut self, cursor: &PageCursor) -> StorageResult<()> {
        self.cursor = Some(cursor.clone());
        self.log(format!("cursor {} page {}", cursor.partition.slug(), cursor.page));
        Ok(())
    }

    fn clear_page_cursor(&mut self) -> StorageResult<()> {
        self.cursor = None;
        self.log("clear cursor".to_string());
        Ok(())
    }

    fn swap_partition_fingerprint(&mut self, fingerprint: &str) -> StorageResult<Option<String>> {
        Ok(self.fingerprint.replace(fingerprint.to_string()))
    }
}

impl CheckpointStore for Arc<Mutex<MemoryCheckpointStore>> {
    fn load_completed_partitions(&self) -> StorageResult<BTreeSet<Partition>> {
        self.lock().unwrap().load_completed_partitions()
    }

    fn load_page_cursor(&self) -> StorageResult<Option<PageCursor>> {
        self.lock().unwrap().load_page_cursor()
    }

    fn record_partition_complete(&mut self, partition: &Partition) -> StorageResult<()> {
        self.lock().unwrap().record_partition_complete(partition)
    }

    fn record_page_progress(&mut self, cursor: &PageCursor) -> StorageResult<()> {
        self.lock().unwrap().record_page_progress(cursor)
    }

    fn clear_page_cursor(&mut self) -> StorageResult<()> {
        self.lock().unwrap().clear_page_cursor()
    }

    fn swap_partition_fingerprint(&mut self, fingerprint: &str) -> StorageResult<Option<String>> {
        self.lock().unwrap().swap_partition_fingerprint(fingerprint)
    }
}

/// Site client answering from scripted responses
///
/// Listing pages not scripted come back empty. Detail pages default to a
/// `token-{id}` token and records to a complete advert and vehicle.
#[derive(Default)]
pub struct ScriptedClient {
    listings: HashMap<u32, FetchResult<ListingPage>>,
    partition_listings: HashMap<(Partition, u32), FetchResult<ListingPage>>,
    details: HashMap<String, FetchResult<DetailPage>>,
    records: HashMap<String, Value>,
    cancel_after: Option<(usize, CancellationToken)>,
    listing_log: Mutex<Vec<(Partition, u32)>>,
    detail_requests: AtomicUsize,
    image_requests: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(mut self, page: u32, stubs: Vec<ItemStub>, last_page: Option<u32>) -> Self {
        self.listings
            .insert(page, Ok(ListingPage { stubs, last_page }));
        self
    }

    pub fn with_listing_error(mut self, page: u32, error: FetchError) -> Self {
        self.listings.insert(page, Err(error));
        self
    }

    pub fn with_partition_listing_error(
        mut self,
        partition: Partition,
        page: u32,
        error: FetchError,
    ) -> Self {
        self.partition_listings.insert((partition, page), Err(error));
        self
    }

    pub fn with_detail(mut self, id: &str, detail: FetchResult<DetailPage>) -> Self {
        self.details.insert(id.to_string(), detail);
        self
    }

    pub fn with_record(mut self, id: &str, value: Value) -> Self {
        self.records.insert(id.to_string(), value);
        self
    }

    /// Cancels `token` while serving the `n`th detail request
    pub fn cancel_after_details(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn listing_log(&self) -> Vec<(Partition, u32)> {
        self.listing_log.lock().unwrap().clone()
    }

    pub fn listing_requests(&self) -> usize {
        self.listing_log.lock().unwrap().len()
    }

    pub fn image_requests(&self) -> usize {
        self.image_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteClient for ScriptedClient {
    async fn fetch_listing(&self, partition: &Partition, page: u32) -> FetchResult<ListingPage> {
        self.listing_log
            .lock()
            .unwrap()
            .push((partition.clone(), page));

        if let Some(scripted) = self.partition_listings.get(&(partition.clone(), page)) {
            return scripted.clone();
        }
        self.listings
            .get(&page)
            .cloned()
            .unwrap_or_else(|| Ok(ListingPage::default()))
    }

    async fn fetch_detail(&self, stub: &ItemStub) -> FetchResult<DetailPage> {
        let served = self.detail_requests.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_after {
            if served == *n {
                token.cancel();
            }
        }

        self.details.get(&stub.id).cloned().unwrap_or_else(|| {
            Ok(DetailPage {
                correlation_token: Some(format!("token-{}", stub.id)),
            })
        })
    }

    async fn fetch_record(&self, stub: &ItemStub, _token: &str) -> FetchResult<Value> {
        Ok(self.records.get(&stub.id).cloned().unwrap_or_else(|| {
            json!({
                "advert": {
                    "imageUrls": [format!("https://img.example.com/{}/%7Bresize%7D/1.jpg", stub.id)],
                    "description": format!("Item {}", stub.id)
                },
                "vehicle": {"make": "Volvo", "derivativeId": format!("d-{}", stub.id)}
            })
        }))
    }

    async fn fetch_image(&self, url: &str) -> FetchResult<Vec<u8>> {
        self.image_requests.fetch_add(1, Ordering::SeqCst);
        Ok(url.as_bytes().to_vec())
    }

    async fn fetch_specs(&self, derivative_id: &str) -> FetchResult<Value> {
        Ok(json!({"derivative": derivative_id, "engine": "2.0"}))
    }
}

//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the listing, detail, record,
//! image and specification endpoints and drive full crawl runs end-to-end.

use partition_crawler::config::{
    BatchFormat, Config, CrawlerConfig, ExtractionConfig, OutputConfig, PartitionConfig,
    SelectorConfig, SiteConfig,
};
use partition_crawler::crawler::Coordinator;
use partition_crawler::state::Partition;
use partition_crawler::storage::{
    BatchSink, CheckpointStore, FileCheckpointStore, JsonBatchSink, SqliteBatchSink,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "tok-123.abc";

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, facets: &[&str], dir: &Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            min_delay_ms: 5,
            floor_delay_ms: 1,
            jitter_ms: 0,
            initial_latency_ms: 50,
            request_timeout_ms: 5000,
            page_cap: 100,
            max_images: 7,
            flush_threshold: 130,
            timeout_cooldown_ms: 10,
            connection_cooldown_ms: 10,
            // Localhost latencies swing wildly; keep slowdown detection out of the way
            slowdown_factor: 1000.0,
            slowdown_cooldown_ms: 10,
            listing_retries: 1,
        },
        site: SiteConfig {
            base_url: base_url.to_string(),
            listing_path: "/car-search".to_string(),
            record_path: "/json/fpa/initial".to_string(),
            specs_path: "/car-specs".to_string(),
            user_agent: "partition-crawler-test".to_string(),
            page_param: "page".to_string(),
            derivative_param: "derivative".to_string(),
            listing_params: BTreeMap::from([("sort".to_string(), "price-asc".to_string())]),
            specs_params: BTreeMap::new(),
            selectors: SelectorConfig::default(),
        },
        partitions: PartitionConfig {
            facet_param: "body-type".to_string(),
            facet_values: facets.iter().map(|f| f.to_string()).collect(),
            range_lower_param: "price-from".to_string(),
            range_upper_param: "price-to".to_string(),
            range_start: 0,
            range_end: 1000,
            range_step: 1000,
            range_upper_inclusive: true,
        },
        extraction: ExtractionConfig::default(),
        output: OutputConfig {
            state_dir: dir.join("state").to_string_lossy().into_owned(),
            format: BatchFormat::Json,
            batch_dir: dir.join("batches").to_string_lossy().into_owned(),
            database_path: dir.join("records.db").to_string_lossy().into_owned(),
        },
    }
}

fn listing_html(ids: &[&str], last_page: u32) -> String {
    let items: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<li class="search-page__result">
                     <a class="js-click-handler" href="/car-details/{id}?sort=price-asc">Car {id}</a>
                     <div class="product-card-pricing__price"><span>£{id},000</span></div>
                   </li>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><ul>{}</ul>
           <ul><li class="paginationMini__count">Page <strong>1</strong> of <strong>{}</strong></li></ul>
           </body></html>"#,
        items, last_page
    )
}

async fn mount_listing(server: &MockServer, facet: &str, page: u32, ids: &[&str], last_page: u32) {
    Mock::given(method("GET"))
        .and(path("/car-search"))
        .and(query_param("body-type", facet))
        .and(query_param("price-from", "0"))
        .and(query_param("price-to", "999"))
        .and(query_param("page", page.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(ids, last_page)))
        .mount(server)
        .await;
}

/// Mounts the detail, record, image and specification endpoints
async fn mount_item_endpoints(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/car-details/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><script>window.AT.correlationId = "{}";</script></html>"#,
            TOKEN
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/json/fpa/initial/\d+$"))
        .and(query_param("guid", TOKEN))
        .and(query_param("sort", "price-asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "advert": {
                "imageUrls": [
                    format!("{}/images/%7Bresize%7D/front.jpg", server.uri()),
                    format!("{}/images/%7Bresize%7D/back.jpg", server.uri())
                ],
                "description": "One careful owner"
            },
            "vehicle": {"make": "Volvo", "derivativeId": "d-42"}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/images/[a-z]+\.jpg$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/car-specs"))
        .and(query_param("derivative", "d-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"engine": "2.0L"})))
        .mount(server)
        .await;
}

async fn listing_requests(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == "/car-search")
        .map(|r| r.url.to_string())
        .collect()
}

#[tokio::test]
async fn test_full_crawl_single_partition() {
    let server = MockServer::start().await;
    mount_listing(&server, "SUV", 1, &["101", "102"], 2).await;
    mount_listing(&server, "SUV", 2, &["103"], 2).await;
    mount_item_endpoints(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &["SUV"], dir.path());

    let mut coordinator = Coordinator::new(config, false).expect("Failed to create coordinator");
    let summary = coordinator.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.partitions_total, 1);
    assert_eq!(summary.partitions_completed, 1);
    assert_eq!(summary.records_collected, 3);
    assert_eq!(summary.items_seen, 3);
    assert_eq!(summary.errors_encountered(), 0);
    assert!(!summary.cancelled);

    let sink = JsonBatchSink::new(&dir.path().join("batches")).unwrap();
    assert_eq!(sink.batch_names().unwrap(), vec!["suv_0-1000_0-3"]);

    let batch = sink.read_batch("suv_0-1000_0-3").unwrap();
    assert_eq!(batch.facet, "SUV");
    assert_eq!(batch.records.len(), 3);
    let ids: Vec<_> = batch.records.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["101", "102", "103"]);

    let record = &batch.records[0];
    assert_eq!(record.price, "£101,000");
    assert_eq!(record.price_value, 101000.0);
    assert_eq!(record.description, "One careful owner");
    assert_eq!(record.session_id, TOKEN);
    assert_eq!(record.images, vec![vec![0xFF, 0xD8, 0xFF]; 2]);
    assert!(record.specs.is_available());

    let store = FileCheckpointStore::open(&dir.path().join("state")).unwrap();
    let checkpoint = store.checkpoint().unwrap();
    assert!(checkpoint.completed.contains(&Partition::new("SUV", 0, 1000)));
    assert!(checkpoint.cursor.is_none());
}

#[tokio::test]
async fn test_second_run_skips_completed_partitions() {
    let server = MockServer::start().await;
    mount_listing(&server, "SUV", 1, &["101"], 1).await;
    mount_item_endpoints(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &["SUV"], dir.path());

    let first = Coordinator::new(config.clone(), false)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.partitions_completed, 1);
    let requests = server.received_requests().await.unwrap_or_default().len();

    let second = Coordinator::new(config, false)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.partitions_skipped, 1);
    assert_eq!(second.partitions_completed, 0);
    assert_eq!(second.records_collected, 0);
    assert_eq!(
        server.received_requests().await.unwrap_or_default().len(),
        requests
    );

    let sink = JsonBatchSink::new(&dir.path().join("batches")).unwrap();
    assert_eq!(sink.batch_names().unwrap().len(), 1);
}

#[tokio::test]
async fn test_fresh_run_discards_markers() {
    let server = MockServer::start().await;
    mount_listing(&server, "SUV", 1, &["101"], 1).await;
    mount_item_endpoints(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &["SUV"], dir.path());

    Coordinator::new(config.clone(), false)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let again = Coordinator::new(config, true)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(again.partitions_skipped, 0);
    assert_eq!(again.partitions_completed, 1);
    assert_eq!(listing_requests(&server).await.len(), 2);
}

#[tokio::test]
async fn test_page_cap_limits_listing_requests() {
    let server = MockServer::start().await;
    mount_listing(&server, "SUV", 1, &["101"], 3).await;
    mount_listing(&server, "SUV", 2, &["102"], 3).await;
    mount_listing(&server, "SUV", 3, &["103"], 3).await;
    mount_item_endpoints(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &["SUV"], dir.path());
    config.crawler.page_cap = 2;

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.records_collected, 2);
    let requests = listing_requests(&server).await;
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|url| !url.contains("page=3")));
}

#[tokio::test]
async fn test_throttled_partition_fails_and_run_continues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/car-search"))
        .and(query_param("body-type", "Estate"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    mount_listing(&server, "SUV", 1, &["101"], 1).await;
    mount_item_endpoints(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &["SUV", "Estate"], dir.path());

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.partitions_completed, 1);
    assert_eq!(summary.partitions_failed.len(), 1);
    assert_eq!(summary.partitions_failed[0].0, Partition::new("Estate", 0, 1000));
    assert!(summary.throttles >= 1);
    assert!(summary.cooldowns.slowdown >= 1);

    let store = FileCheckpointStore::open(&dir.path().join("state")).unwrap();
    let completed = store.load_completed_partitions().unwrap();
    assert!(!completed.contains(&Partition::new("Estate", 0, 1000)));
    assert!(completed.contains(&Partition::new("SUV", 0, 1000)));
}

#[tokio::test]
async fn test_failed_item_is_logged_and_skipped() {
    let server = MockServer::start().await;
    mount_listing(&server, "SUV", 1, &["101", "102"], 1).await;
    // Registered first so it wins over the generic detail mock
    Mock::given(method("GET"))
        .and(path("/car-details/101"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_item_endpoints(&server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &["SUV"], dir.path());

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.partitions_completed, 1);
    assert_eq!(summary.records_collected, 1);
    assert_eq!(summary.items_failed, 1);

    let diagnostics =
        std::fs::read_to_string(dir.path().join("state").join("diagnostics.csv")).unwrap();
    let lines: Vec<&str> = diagnostics.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(",permanent,suv_0-1000,1,0"));
}

#[tokio::test]
async fn test_sqlite_batches() {
    let server = MockServer::start().await;
    mount_listing(&server, "SUV", 1, &["101", "102"], 1).await;
    mount_item_endpoints(&server).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &["SUV"], dir.path());
    config.output.format = BatchFormat::Sqlite;

    let summary = Coordinator::new(config, false)
        .unwrap()
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.records_collected, 2);

    let sink = SqliteBatchSink::new(&dir.path().join("records.db")).unwrap();
    assert_eq!(sink.count_records().unwrap(), 2);
    let records = sink.load_batch("suv_0-1000_0-2").unwrap();
    assert_eq!(records[1].item_id, "102");
    assert_eq!(records[1].images.len(), 2);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config("https://example.com", &["SUV"], dir.path());
    config.partitions.range_step = 0;

    assert!(Coordinator::new(config, false).is_err());
}

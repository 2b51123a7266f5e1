use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Partition-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub site: SiteConfig,
    pub partitions: PartitionConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
}

/// Pacing, cooldown and work-bounding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Minimum delay between paced requests (milliseconds)
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Lower clamp applied after jitter so no wait is ever zero (milliseconds)
    #[serde(rename = "floor-delay-ms")]
    pub floor_delay_ms: u64,

    /// Half-width of the uniform jitter added to each wait (milliseconds)
    #[serde(rename = "jitter-ms", default)]
    pub jitter_ms: u64,

    /// Latency assumed before the first response is observed (milliseconds)
    #[serde(rename = "initial-latency-ms")]
    pub initial_latency_ms: u64,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// Hard cap on pages walked per partition
    #[serde(rename = "page-cap")]
    pub page_cap: u32,

    /// Maximum number of images fetched per item
    #[serde(rename = "max-images")]
    pub max_images: usize,

    /// Number of buffered records that triggers a batch flush
    #[serde(rename = "flush-threshold")]
    pub flush_threshold: usize,

    /// Cooldown after a request timeout (milliseconds)
    #[serde(rename = "timeout-cooldown-ms")]
    pub timeout_cooldown_ms: u64,

    /// Cooldown after a connection-level failure (milliseconds)
    #[serde(rename = "connection-cooldown-ms")]
    pub connection_cooldown_ms: u64,

    /// Latency ratio between consecutive listing fetches treated as throttling
    #[serde(rename = "slowdown-factor", default = "default_slowdown_factor")]
    pub slowdown_factor: f64,

    /// Extended cooldown taken after a slowdown or throttle signal (milliseconds)
    #[serde(rename = "slowdown-cooldown-ms")]
    pub slowdown_cooldown_ms: u64,

    /// Extra attempts for a listing page that fails transiently
    #[serde(rename = "listing-retries", default = "default_listing_retries")]
    pub listing_retries: u32,
}

fn default_slowdown_factor() -> f64 {
    5.0
}

fn default_listing_retries() -> u32 {
    2
}

/// Remote site endpoints and request shaping
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Root URL that every path below is joined onto
    pub base_url: String,

    /// Path of the paginated search listing
    pub listing_path: String,

    /// Path prefix of the structured record endpoint; the item id is appended
    pub record_path: String,

    /// Path of the specification endpoint
    pub specs_path: String,

    pub user_agent: String,

    /// Query parameter carrying the listing page number
    #[serde(default = "default_page_param")]
    pub page_param: String,

    /// Query parameter carrying the derivative id on specification requests
    #[serde(default = "default_derivative_param")]
    pub derivative_param: String,

    /// Static query parameters sent with every listing request
    #[serde(default)]
    pub listing_params: BTreeMap<String, String>,

    /// Static query parameters sent with every specification request
    #[serde(default)]
    pub specs_params: BTreeMap<String, String>,

    #[serde(default)]
    pub selectors: SelectorConfig,
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_derivative_param() -> String {
    "derivative".to_string()
}

/// Markup selectors used to read listing and detail pages
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SelectorConfig {
    pub result_item: String,
    pub item_link: String,
    pub item_price: String,
    pub page_count: String,
    /// Regex whose first capture group is the correlation token
    pub token_pattern: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            result_item: "li.search-page__result".to_string(),
            item_link: "a.js-click-handler".to_string(),
            item_price: "div.product-card-pricing__price span".to_string(),
            page_count: "li.paginationMini__count".to_string(),
            token_pattern: r#"window\.AT\.correlationId = "([\w|.|-]+)"#.to_string(),
        }
    }
}

/// Shape of the partition space
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionConfig {
    /// Query parameter carrying the categorical facet
    pub facet_param: String,

    /// All categorical facet values to cover
    pub facet_values: Vec<String>,

    /// Query parameter carrying the inclusive lower range bound
    pub range_lower_param: String,

    /// Query parameter carrying the upper range bound
    pub range_upper_param: String,

    pub range_start: i64,
    pub range_end: i64,
    pub range_step: i64,

    /// Whether the site reads the upper bound inclusively (sends `upper - 1`)
    #[serde(default = "default_true")]
    pub range_upper_inclusive: bool,
}

fn default_true() -> bool {
    true
}

/// Completeness policy for extracted records
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractionConfig {
    /// Structured attribute keys whose absence excludes an item
    #[serde(default)]
    pub critical_fields: Vec<String>,

    /// Exclude items whose specification data is unavailable
    #[serde(default)]
    pub require_specs: bool,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory holding checkpoint markers and the diagnostics log
    #[serde(rename = "state-dir")]
    pub state_dir: String,

    /// Durable batch format
    #[serde(default)]
    pub format: BatchFormat,

    /// Directory receiving JSON batches
    #[serde(rename = "batch-dir", default)]
    pub batch_dir: String,

    /// Path to the SQLite database file for the sqlite format
    #[serde(rename = "database-path", default)]
    pub database_path: String,
}

/// Supported durable batch formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchFormat {
    #[default]
    Json,
    Sqlite,
}

//! HTTP transport implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Building listing, record and specification URLs
//! - Classifying transport failures into [`FetchError`] kinds

use crate::config::{Config, PartitionConfig, SiteConfig};
use crate::crawler::client::{
    DetailPage, FetchError, FetchResult, ItemStub, ListingPage, SiteClient,
};
use crate::crawler::parser::ListingParser;
use crate::state::Partition;
use crate::url::{normalize_image_url, query_pairs, resolve_link};
use crate::{CrawlError, UrlError};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - User agent header sent with every request
/// * `timeout` - Upper bound on every round trip
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`SiteClient`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpSiteClient {
    client: Client,
    base: Url,
    site: SiteConfig,
    partitions: PartitionConfig,
    parser: ListingParser,
}

impl HttpSiteClient {
    /// Creates a client for the configured site
    pub fn new(config: &Config) -> Result<Self, CrawlError> {
        let client = build_http_client(
            &config.site.user_agent,
            Duration::from_millis(config.crawler.request_timeout_ms),
        )?;
        let base = Url::parse(&config.site.base_url)
            .map_err(|e| UrlError::Parse(format!("{}: {}", config.site.base_url, e)))?;

        Ok(Self {
            client,
            base,
            site: config.site.clone(),
            partitions: config.partitions.clone(),
            parser: ListingParser::new(&config.site.selectors)?,
        })
    }

    /// Builds the listing URL for one page of a partition
    ///
    /// Every page carries the partition's facet and range, not only page 1.
    pub fn listing_url(&self, partition: &Partition, page: u32) -> FetchResult<Url> {
        let mut url = self.join(&self.site.listing_path)?;
        let upper = if self.partitions.range_upper_inclusive {
            partition.range.upper - 1
        } else {
            partition.range.upper
        };

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.site.listing_params {
                query.append_pair(key, value);
            }
            query.append_pair(&self.partitions.facet_param, &partition.facet);
            query.append_pair(
                &self.partitions.range_lower_param,
                &partition.range.lower.to_string(),
            );
            query.append_pair(&self.partitions.range_upper_param, &upper.to_string());
            query.append_pair(&self.site.page_param, &page.to_string());
        }
        Ok(url)
    }

    /// Builds the structured record URL for an item
    pub fn record_url(&self, stub: &ItemStub, token: &str) -> FetchResult<Url> {
        let path = format!("{}/{}", self.site.record_path.trim_end_matches('/'), stub.id);
        let mut url = self.join(&path)?;
        let params = query_pairs(&self.base, &stub.link).map_err(decode_error)?;

        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &params {
                query.append_pair(key, value);
            }
            query.append_pair("guid", token);
        }
        Ok(url)
    }

    /// Builds the specification URL for a derivative id
    pub fn specs_url(&self, derivative_id: &str) -> FetchResult<Url> {
        let mut url = self.join(&self.site.specs_path)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.site.specs_params {
                query.append_pair(key, value);
            }
            query.append_pair(&self.site.derivative_param, derivative_id);
        }
        Ok(url)
    }

    fn join(&self, path: &str) -> FetchResult<Url> {
        self.base
            .join(path)
            .map_err(|e| FetchError::Decode(format!("bad path {}: {}", path, e)))
    }

    async fn get(&self, url: Url) -> FetchResult<Response> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_text(&self, url: Url) -> FetchResult<String> {
        self.get(url).await?.text().await.map_err(classify_error)
    }

    async fn get_json(&self, url: Url) -> FetchResult<Value> {
        let body = self.get(url).await?.bytes().await.map_err(classify_error)?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SiteClient for HttpSiteClient {
    async fn fetch_listing(&self, partition: &Partition, page: u32) -> FetchResult<ListingPage> {
        let url = self.listing_url(partition, page)?;
        let html = self.get_text(url).await?;
        Ok(self.parser.parse_listing(&html))
    }

    async fn fetch_detail(&self, stub: &ItemStub) -> FetchResult<DetailPage> {
        let url = resolve_link(&self.base, &stub.link).map_err(decode_error)?;
        let html = self.get_text(url).await?;
        Ok(DetailPage {
            correlation_token: self.parser.extract_token(&html),
        })
    }

    async fn fetch_record(&self, stub: &ItemStub, token: &str) -> FetchResult<Value> {
        let url = self.record_url(stub, token)?;
        self.get_json(url).await
    }

    async fn fetch_image(&self, url: &str) -> FetchResult<Vec<u8>> {
        let url = normalize_image_url(url).map_err(decode_error)?;
        let bytes = self.get(url).await?.bytes().await.map_err(classify_error)?;
        Ok(bytes.to_vec())
    }

    async fn fetch_specs(&self, derivative_id: &str) -> FetchResult<Value> {
        let url = self.specs_url(derivative_id)?;
        self.get_json(url).await
    }
}

/// Maps a transport error onto the walker's failure kinds
fn classify_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.is_decode() || err.is_builder() {
        FetchError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::Status {
            status: status.as_u16(),
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
        }
    } else {
        // Connect, reset, body and redirect failures
        FetchError::Connection(err.to_string())
    }
}

fn decode_error(err: UrlError) -> FetchError {
    FetchError::Decode(err.to_string())
}

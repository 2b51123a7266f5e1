//! Extraction of listing pages, detail tokens and structured records
//!
//! This module handles parsing site content into typed results:
//! - Item stubs and the declared last page from a listing page
//! - The correlation token from an item detail page
//! - The advert and vehicle bodies of a structured record
//! - Listed prices normalized to numbers

use crate::config::{ExtractionConfig, SelectorConfig};
use crate::crawler::client::{ItemStub, ListingPage};
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// Why an item was left out of the record buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("correlation token not found on detail page")]
    MissingToken,

    #[error("listing shows no usable price")]
    MissingPrice,

    #[error("structured record has no advert body")]
    MissingAdvert,

    #[error("structured record has no vehicle body")]
    MissingVehicle,

    #[error("critical field '{0}' is missing")]
    MissingCriticalField(String),

    #[error("specification data unavailable")]
    MissingSpecs,
}

/// Compiled selectors for one site's markup
#[derive(Debug, Clone)]
pub struct ListingParser {
    result_item: Selector,
    item_link: Selector,
    item_price: Selector,
    page_count: Selector,
    token: Regex,
}

impl ListingParser {
    /// Compiles the configured selectors and token pattern
    ///
    /// # Arguments
    ///
    /// * `selectors` - The selector configuration
    ///
    /// # Returns
    ///
    /// * `Ok(ListingParser)` - Every selector compiled
    /// * `Err(ConfigError)` - A selector or the token regex is invalid
    pub fn new(selectors: &SelectorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            result_item: compile_selector(&selectors.result_item)?,
            item_link: compile_selector(&selectors.item_link)?,
            item_price: compile_selector(&selectors.item_price)?,
            page_count: compile_selector(&selectors.page_count)?,
            token: Regex::new(&selectors.token_pattern)
                .map_err(|e| ConfigError::InvalidPattern(format!("token-pattern: {}", e)))?,
        })
    }

    /// Reads item stubs and the declared last page from a listing page
    ///
    /// Result items without a link or an item id are skipped. Items whose
    /// price is missing are kept; the walker excludes them.
    pub fn parse_listing(&self, html: &str) -> ListingPage {
        let document = Html::parse_document(html);

        let mut stubs = Vec::new();
        for item in document.select(&self.result_item) {
            let Some(link) = item
                .select(&self.item_link)
                .find_map(|a| a.value().attr("href"))
                .map(|href| href.trim().to_string())
            else {
                tracing::debug!("Result item without link skipped");
                continue;
            };

            let Some(id) = item_id_from_link(&link) else {
                tracing::debug!("No item id in link {}", link);
                continue;
            };

            let price = item
                .select(&self.item_price)
                .next()
                .map(element_text)
                .filter(|text| !text.is_empty());

            stubs.push(ItemStub { id, link, price });
        }

        let last_page = document
            .select(&self.page_count)
            .next()
            .and_then(|element| parse_last_page(&element_text(element)));

        ListingPage { stubs, last_page }
    }

    /// Extracts the correlation token from a detail page
    pub fn extract_token(&self, html: &str) -> Option<String> {
        self.token
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|token| !token.is_empty())
    }
}

fn compile_selector(css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|e| ConfigError::InvalidPattern(format!("'{}': {:?}", css, e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns the last integer in a pagination label such as `Page 1 of 1,204`
pub fn parse_last_page(text: &str) -> Option<u32> {
    text.split_whitespace()
        .rev()
        .map(|token| token.replace(',', ""))
        .find_map(|token| token.parse::<u32>().ok())
}

/// Normalizes a listed price such as `£12,995` to a number
///
/// Returns None if the text holds no digits.
pub fn parse_price(text: &str) -> Option<f64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();

    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok()
}

/// Takes the item id from the last path segment of an item link
///
/// # Examples
///
/// ```
/// use partition_crawler::crawler::item_id_from_link;
///
/// assert_eq!(
///     item_id_from_link("/car-details/202101?sort=price"),
///     Some("202101".to_string())
/// );
/// ```
pub fn item_id_from_link(link: &str) -> Option<String> {
    // A dummy base lets relative links parse
    let base = Url::parse("http://localhost/").ok()?;
    let url = base.join(link.trim()).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}

/// Typed view of a structured record
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRecord {
    pub image_urls: Vec<String>,
    pub description: String,
    pub vehicle: Map<String, Value>,
    pub derivative_id: Option<String>,
}

impl StructuredRecord {
    /// Extracts the advert and vehicle bodies
    ///
    /// Missing bodies are typed errors. Missing image URLs or description
    /// inside a present advert degrade to empty values.
    pub fn from_json(value: &Value) -> Result<Self, ExtractionError> {
        let advert = value
            .get("advert")
            .and_then(Value::as_object)
            .ok_or(ExtractionError::MissingAdvert)?;
        let vehicle = value
            .get("vehicle")
            .and_then(Value::as_object)
            .ok_or(ExtractionError::MissingVehicle)?;

        let image_urls = advert
            .get("imageUrls")
            .and_then(Value::as_array)
            .map(|urls| {
                urls.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let description = advert
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let derivative_id = match vehicle.get("derivativeId") {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        Ok(Self {
            image_urls,
            description,
            vehicle: vehicle.clone(),
            derivative_id,
        })
    }
}

/// Minimum completeness an item must reach to enter the buffer
#[derive(Debug, Clone, Default)]
pub struct CompletenessPolicy {
    pub critical_fields: Vec<String>,
    pub require_specs: bool,
}

impl CompletenessPolicy {
    /// Fails on the first critical vehicle field that is absent or null
    pub fn check(&self, record: &StructuredRecord) -> Result<(), ExtractionError> {
        for field in &self.critical_fields {
            match record.vehicle.get(field) {
                None | Some(Value::Null) => {
                    return Err(ExtractionError::MissingCriticalField(field.clone()))
                }
                Some(_) => {}
            }
        }

        if self.require_specs && record.derivative_id.is_none() {
            return Err(ExtractionError::MissingSpecs);
        }
        Ok(())
    }
}

impl From<&ExtractionConfig> for CompletenessPolicy {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            critical_fields: config.critical_fields.clone(),
            require_specs: config.require_specs,
        }
    }
}

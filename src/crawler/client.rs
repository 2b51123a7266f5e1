//! Site transport interface
//!
//! The walker only talks to the remote site through [`SiteClient`]. The
//! production implementation is [`HttpSiteClient`](crate::crawler::HttpSiteClient);
//! tests script responses in memory.

use crate::state::{CooldownKind, Partition};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// One item as listed on a search page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStub {
    /// Site identifier, taken from the last path segment of the link
    pub id: String,

    /// Link to the item detail page, relative to the site root
    pub link: String,

    /// Price text as shown on the listing, if any
    pub price: Option<String>,
}

/// One page of a partition's search listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub stubs: Vec<ItemStub>,

    /// Last page number declared by the pagination markup
    pub last_page: Option<u32>,
}

/// The parts of an item detail page the walker needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailPage {
    /// Session credential authorizing the structured record fetch
    pub correlation_token: Option<String>,
}

/// Failure of a single network round trip
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

/// How the walker reacts to a fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connection,
    /// The server asked us to slow down
    Throttled,
    /// Retrying will not help; abandon the item
    Permanent,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Connection(_) => FailureKind::Connection,
            Self::Status { status: 429 | 503, .. } => FailureKind::Throttled,
            Self::Status { .. } | Self::Decode(_) => FailureKind::Permanent,
        }
    }

    /// Cooldown owed after this failure, if any
    pub fn cooldown(&self) -> Option<CooldownKind> {
        match self.kind() {
            FailureKind::Timeout => Some(CooldownKind::Timeout),
            FailureKind::Connection => Some(CooldownKind::Connection),
            FailureKind::Throttled => Some(CooldownKind::Slowdown),
            FailureKind::Permanent => None,
        }
    }

    /// Returns true if the same request may succeed after a cooldown
    pub fn is_transient(&self) -> bool {
        self.kind() != FailureKind::Permanent
    }

    /// Short label used in the diagnostics log
    pub fn label(&self) -> &'static str {
        match self.kind() {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Throttled => "throttled",
            FailureKind::Permanent => "permanent",
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Remote site operations used by the page walker
///
/// Every method is a single round trip. Implementations must not retry or
/// sleep; pacing and recovery belong to the walker.
#[async_trait]
pub trait SiteClient: Send + Sync {
    /// Fetches one listing page of `partition`
    async fn fetch_listing(&self, partition: &Partition, page: u32) -> FetchResult<ListingPage>;

    /// Fetches the item detail page and extracts its correlation token
    async fn fetch_detail(&self, stub: &ItemStub) -> FetchResult<DetailPage>;

    /// Fetches the structured record authorized by `token`
    async fn fetch_record(&self, stub: &ItemStub, token: &str) -> FetchResult<Value>;

    /// Fetches one raw image payload
    async fn fetch_image(&self, url: &str) -> FetchResult<Vec<u8>>;

    /// Fetches the specification map for a derivative id
    async fn fetch_specs(&self, derivative_id: &str) -> FetchResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttling_statuses() {
        for status in [429, 503] {
            let err = FetchError::Status {
                status,
                url: "https://example.com".to_string(),
            };
            assert_eq!(err.kind(), FailureKind::Throttled);
            assert_eq!(err.cooldown(), Some(CooldownKind::Slowdown));
        }
    }

    #[test]
    fn test_permanent_failures_take_no_cooldown() {
        let not_found = FetchError::Status {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert_eq!(not_found.kind(), FailureKind::Permanent);
        assert!(not_found.cooldown().is_none());
        assert!(!FetchError::Decode("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_transient_failures() {
        assert_eq!(
            FetchError::Timeout("slow".to_string()).cooldown(),
            Some(CooldownKind::Timeout)
        );
        assert_eq!(
            FetchError::Connection("reset".to_string()).cooldown(),
            Some(CooldownKind::Connection)
        );
        assert!(FetchError::Connection("reset".to_string()).is_transient());
    }
}

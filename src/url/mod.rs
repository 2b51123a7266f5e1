//! URL handling module for Partition-Crawler
//!
//! This module resolves item links against the site root, normalizes image
//! URLs to their unscaled form, reads item query parameters and derives
//! file-name safe slugs.

mod normalize;

// Re-export main functions
pub use normalize::{normalize_image_url, query_pairs, resolve_link, slugify};

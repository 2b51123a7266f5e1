//! Partition identity
//!
//! A partition is one categorical facet value combined with a half-open
//! numeric range. Partitions order lexicographically by facet, then range.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open numeric range `[lower, upper)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NumericRange {
    pub lower: i64,
    pub upper: i64,
}

impl NumericRange {
    pub fn new(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }
}

/// One independent unit of the enumerated search space
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    pub facet: String,
    pub range: NumericRange,
}

impl Partition {
    pub fn new(facet: impl Into<String>, lower: i64, upper: i64) -> Self {
        Self {
            facet: facet.into(),
            range: NumericRange::new(lower, upper),
        }
    }

    /// Serializes the partition as a completion-log line (without newline)
    pub fn to_marker(&self) -> String {
        format!("{},{},{}", self.facet, self.range.lower, self.range.upper)
    }

    /// Parses a completion-log line produced by [`Partition::to_marker`]
    ///
    /// Returns None for anything that is not exactly `facet,lower,upper`
    /// with `lower < upper`.
    pub fn from_marker(line: &str) -> Option<Self> {
        let mut parts = line.trim_end_matches(['\r', '\n']).rsplitn(3, ',');
        let upper = parts.next()?.trim().parse::<i64>().ok()?;
        let lower = parts.next()?.trim().parse::<i64>().ok()?;
        let facet = parts.next()?;

        if facet.is_empty() || lower >= upper {
            return None;
        }

        Some(Self::new(facet, lower, upper))
    }

    /// File-name safe identity used to name durable batches
    pub fn slug(&self) -> String {
        format!(
            "{}_{}-{}",
            crate::url::slugify(&self.facet),
            self.range.lower,
            self.range.upper
        )
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {})",
            self.facet, self.range.lower, self.range.upper
        )
    }
}

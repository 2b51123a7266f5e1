//! Partition planning
//!
//! The partition space is the cartesian product of the facet values and the
//! contiguous ranges of `step` covering `[start, end)`. The last range is cut
//! short at `end` when the step does not divide the bound evenly.

use crate::config::PartitionConfig;
use crate::state::{NumericRange, Partition};
use crate::ConfigError;
use crate::url::slugify;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Global numeric bound and step of the partition space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: i64,
    pub end: i64,
    pub step: i64,
}

impl From<&PartitionConfig> for RangeSpec {
    fn from(config: &PartitionConfig) -> Self {
        Self {
            start: config.range_start,
            end: config.range_end,
            step: config.range_step,
        }
    }
}

/// Splits the global bound into contiguous half-open ranges
pub fn split_ranges(spec: &RangeSpec) -> Result<Vec<NumericRange>, ConfigError> {
    if spec.step <= 0 {
        return Err(ConfigError::Validation(format!(
            "range step must be positive, got {}",
            spec.step
        )));
    }
    if spec.end <= spec.start {
        return Err(ConfigError::Validation(format!(
            "range end ({}) must be greater than start ({})",
            spec.end, spec.start
        )));
    }

    let mut ranges = Vec::new();
    let mut lower = spec.start;
    while lower < spec.end {
        let upper = lower.saturating_add(spec.step).min(spec.end);
        ranges.push(NumericRange::new(lower, upper));
        lower = upper;
    }
    Ok(ranges)
}

/// Enumerates every partition in deterministic order
///
/// Facets are deduplicated and ordered lexicographically; ranges ascend
/// within each facet.
///
/// # Arguments
///
/// * `facets` - Categorical facet values
/// * `spec` - Global numeric bound and step
///
/// # Returns
///
/// * `Ok(Vec<Partition>)` - Non-overlapping cover of the search space
/// * `Err(ConfigError)` - Empty facet list or invalid range
pub fn plan(facets: &[String], spec: &RangeSpec) -> Result<Vec<Partition>, ConfigError> {
    let facets: BTreeSet<&str> = facets.iter().map(|f| f.trim()).collect();
    if facets.is_empty() || facets.contains("") {
        return Err(ConfigError::Validation(
            "at least one non-empty facet value is required".to_string(),
        ));
    }

    check_facet_slugs(facets.iter().copied())?;
    let ranges = split_ranges(spec)?;

    let partitions: Vec<Partition> = facets
        .iter()
        .flat_map(|facet| {
            ranges.iter().map(move |range| Partition {
                facet: facet.to_string(),
                range: *range,
            })
        })
        .collect();

    tracing::debug!(
        "Planned {} partitions ({} facets x {} ranges)",
        partitions.len(),
        facets.len(),
        ranges.len()
    );
    Ok(partitions)
}

/// Rejects distinct facet values that would share a batch name
///
/// Batch names carry the facet only as a slug, so two facets reducing to the
/// same slug (`"Pick Up"` and `"Pick-Up"`) would overwrite each other's batches.
pub fn check_facet_slugs<'a>(facets: impl IntoIterator<Item = &'a str>) -> Result<(), ConfigError> {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    for facet in facets {
        let facet = facet.trim();
        let slug = slugify(facet);
        match seen.get(slug.as_str()) {
            Some(other) if *other != facet => {
                return Err(ConfigError::Validation(format!(
                    "facet values '{}' and '{}' both map to batch name prefix '{}'",
                    other, facet, slug
                )));
            }
            _ => {
                seen.insert(slug, facet);
            }
        }
    }
    Ok(())
}

/// Plans the partition space described by the configuration
pub fn plan_from_config(config: &PartitionConfig) -> Result<Vec<Partition>, ConfigError> {
    plan(&config.facet_values, &RangeSpec::from(config))
}

/// Drops partitions already recorded as complete, keeping order
pub fn filter_completed(
    partitions: &[Partition],
    completed: &BTreeSet<Partition>,
) -> Vec<Partition> {
    partitions
        .iter()
        .filter(|p| !completed.contains(p))
        .cloned()
        .collect()
}

/// Moves the interrupted partition, if still pending, to the front
pub fn resume_first(mut remaining: Vec<Partition>, interrupted: Option<&Partition>) -> Vec<Partition> {
    if let Some(interrupted) = interrupted {
        if let Some(index) = remaining.iter().position(|p| p == interrupted) {
            let partition = remaining.remove(index);
            remaining.insert(0, partition);
        }
    }
    remaining
}

/// SHA-256 over the marker lines of the planned space
pub fn fingerprint(partitions: &[Partition]) -> String {
    let mut hasher = Sha256::new();
    for partition in partitions {
        hasher.update(partition.to_marker().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

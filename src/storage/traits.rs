//! Storage traits and error types
//!
//! This module defines the interfaces for checkpoint markers and durable
//! record batches, plus the associated error types.

use crate::output::ItemRecord;
use crate::state::{PageCursor, Partition};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable progress markers
///
/// Completion markers are append-only; the page cursor is overwritten in
/// place. Both are kept apart from the record batches.
pub trait CheckpointStore: Send {
    /// Loads every partition recorded as complete
    ///
    /// A malformed log yields an empty set (with a warning) rather than an error.
    fn load_completed_partitions(&self) -> StorageResult<BTreeSet<Partition>>;

    /// Loads the in-progress cursor, if any
    ///
    /// A malformed marker yields `None` (with a warning) rather than an error.
    fn load_page_cursor(&self) -> StorageResult<Option<PageCursor>>;

    /// Appends a completion marker for `partition`
    fn record_partition_complete(&mut self, partition: &Partition) -> StorageResult<()>;

    /// Overwrites the page cursor with `cursor`
    fn record_page_progress(&mut self, cursor: &PageCursor) -> StorageResult<()>;

    /// Removes the page cursor after its partition is committed
    fn clear_page_cursor(&mut self) -> StorageResult<()>;

    /// Stores the fingerprint of the planned partition space
    ///
    /// Returns the previously stored fingerprint, if one existed.
    fn swap_partition_fingerprint(&mut self, fingerprint: &str) -> StorageResult<Option<String>>;
}

/// A group of records about to become one durable batch
#[derive(Debug, Clone, Copy)]
pub struct RecordBatch<'a> {
    pub partition: &'a Partition,

    /// First partition item counter value covered (inclusive)
    pub first_item: u64,

    /// Last partition item counter value covered (exclusive)
    pub last_item: u64,

    pub records: &'a [ItemRecord],
}

impl RecordBatch<'_> {
    /// Unique batch name derived from partition identity and counter range
    pub fn name(&self) -> String {
        format!(
            "{}_{}-{}",
            self.partition.slug(),
            self.first_item,
            self.last_item
        )
    }

    /// Reads the counter range back out of a batch name for `partition`
    ///
    /// Returns None for names belonging to other partitions.
    pub fn parse_range(partition: &Partition, name: &str) -> Option<(u64, u64)> {
        let rest = name.strip_prefix(&partition.slug())?.strip_prefix('_')?;
        let (first, last) = rest.split_once('-')?;
        Some((first.parse().ok()?, last.parse().ok()?))
    }
}

/// Acknowledgement of a written batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReceipt {
    pub name: String,
    pub records: usize,
    pub first_item: u64,
    pub last_item: u64,
}

/// Destination for durable record batches
pub trait BatchSink: Send {
    /// Writes `batch` durably; rewriting an existing name replaces it
    fn write_batch(&mut self, batch: &RecordBatch<'_>) -> StorageResult<BatchReceipt>;

    /// Names of every batch written so far, sorted
    fn batch_names(&self) -> StorageResult<Vec<String>>;
}

//! In-memory record buffer with threshold flushing

use crate::output::ItemRecord;
use crate::state::Partition;
use crate::storage::{BatchReceipt, BatchSink, RecordBatch, StorageResult};

/// Ordered, append-only record buffer for one partition
///
/// A flush writes the whole buffer as one batch covering the item counter
/// range `[flushed_through, items_seen)` and clears it only once the sink has
/// acknowledged the write. An empty buffer never produces a batch.
#[derive(Debug)]
pub struct RecordBuffer {
    partition: Partition,
    records: Vec<ItemRecord>,
    flushed_through: u64,
    batches_written: usize,
    records_flushed: usize,
}

impl RecordBuffer {
    /// Creates an empty buffer whose next batch starts at `flushed_through`
    pub fn new(partition: Partition, flushed_through: u64) -> Self {
        Self {
            partition,
            records: Vec::new(),
            flushed_through,
            batches_written: 0,
            records_flushed: 0,
        }
    }

    pub fn append(&mut self, record: ItemRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ItemRecord>) {
        self.records.extend(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Item counter value covered by the last batch
    pub fn flushed_through(&self) -> u64 {
        self.flushed_through
    }

    pub fn batches_written(&self) -> usize {
        self.batches_written
    }

    pub fn records_flushed(&self) -> usize {
        self.records_flushed
    }

    /// Flushes if the buffer holds at least `threshold` records
    pub fn flush_if_threshold(
        &mut self,
        threshold: usize,
        items_seen: u64,
        sink: &mut dyn BatchSink,
    ) -> StorageResult<Option<BatchReceipt>> {
        if self.records.len() < threshold {
            return Ok(None);
        }
        self.flush(items_seen, sink).map(Some)
    }

    /// Flushes whatever is buffered; an empty buffer is a no-op
    pub fn force_flush(
        &mut self,
        items_seen: u64,
        sink: &mut dyn BatchSink,
    ) -> StorageResult<Option<BatchReceipt>> {
        if self.records.is_empty() {
            return Ok(None);
        }
        self.flush(items_seen, sink).map(Some)
    }

    fn flush(&mut self, items_seen: u64, sink: &mut dyn BatchSink) -> StorageResult<BatchReceipt> {
        let batch = RecordBatch {
            partition: &self.partition,
            first_item: self.flushed_through,
            last_item: items_seen,
            records: &self.records,
        };
        let receipt = sink.write_batch(&batch)?;

        tracing::debug!(
            "Flushed batch {} ({} records)",
            receipt.name,
            receipt.records
        );

        self.records_flushed += self.records.len();
        self.records.clear();
        self.flushed_through = items_seen;
        self.batches_written += 1;
        Ok(receipt)
    }
}

//! JSON batch files
//!
//! Each batch becomes `{batch-dir}/{name}.json`, written to a temp file,
//! synced, then renamed into place.

use crate::output::ItemRecord;
use crate::storage::traits::{BatchReceipt, BatchSink, RecordBatch, StorageResult};
use crate::storage::write_atomic;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk layout of one JSON batch
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchFile {
    pub name: String,
    pub facet: String,
    pub range_lower: i64,
    pub range_upper: i64,
    pub first_item: u64,
    pub last_item: u64,
    pub written_at: String,
    pub records: Vec<ItemRecord>,
}

/// Batch sink writing one JSON document per batch
#[derive(Debug)]
pub struct JsonBatchSink {
    dir: PathBuf,
}

impl JsonBatchSink {
    /// Creates the sink, creating `dir` if needed
    pub fn new(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn batch_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Reads a previously written batch back
    pub fn read_batch(&self, name: &str) -> StorageResult<BatchFile> {
        let content = fs::read(self.batch_path(name))?;
        Ok(serde_json::from_slice(&content)?)
    }
}

impl BatchSink for JsonBatchSink {
    fn write_batch(&mut self, batch: &RecordBatch<'_>) -> StorageResult<BatchReceipt> {
        let name = batch.name();
        let file = BatchFile {
            name: name.clone(),
            facet: batch.partition.facet.clone(),
            range_lower: batch.partition.range.lower,
            range_upper: batch.partition.range.upper,
            first_item: batch.first_item,
            last_item: batch.last_item,
            written_at: Utc::now().to_rfc3339(),
            records: batch.records.to_vec(),
        };

        let json = serde_json::to_vec(&file)?;
        write_atomic(&self.batch_path(&name), &json)?;

        Ok(BatchReceipt {
            name,
            records: batch.records.len(),
            first_item: batch.first_item,
            last_item: batch.last_item,
        })
    }

    fn batch_names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

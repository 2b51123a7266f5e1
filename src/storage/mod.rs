//! Storage module for checkpoints and durable record batches
//!
//! This module handles everything the crawler writes to disk:
//! - Completion log, page cursor and partition-space fingerprint
//! - Durable record batches as JSON files or SQLite rows
//! - The diagnostics CSV of transient failures

mod batch_json;
mod checkpoint;
mod diagnostics;
mod schema;
mod sqlite;
mod traits;

pub use batch_json::{BatchFile, JsonBatchSink};
pub use checkpoint::FileCheckpointStore;
pub use diagnostics::DiagnosticsLog;
pub use sqlite::SqliteBatchSink;
pub use traits::{
    BatchReceipt, BatchSink, CheckpointStore, RecordBatch, StorageError, StorageResult,
};

use crate::config::{BatchFormat, OutputConfig};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Opens the batch sink selected by the output configuration
///
/// # Arguments
///
/// * `config` - The output configuration
///
/// # Returns
///
/// * `Ok(Box<dyn BatchSink>)` - Sink ready to receive batches
/// * `Err(StorageError)` - Failed to create the directory or database
pub fn open_batch_sink(config: &OutputConfig) -> StorageResult<Box<dyn BatchSink>> {
    match config.format {
        BatchFormat::Json => Ok(Box::new(JsonBatchSink::new(Path::new(&config.batch_dir))?)),
        BatchFormat::Sqlite => {
            let path = Path::new(&config.database_path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            Ok(Box::new(SqliteBatchSink::new(path)?))
        }
    }
}

/// Replaces `path` with `contents` via a synced temp file and a rename
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let mut file = File::create(tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(tmp, path)?;
    if let Some(parent) = path.parent() {
        checkpoint::sync_dir(parent);
    }
    Ok(())
}

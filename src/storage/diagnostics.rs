//! Append-only CSV log of transient failures
//!
//! One line per failure: `timestamp,kind,partition,page,item`. The item
//! column is empty for failures of the listing page itself.

use crate::state::Partition;
use crate::storage::traits::StorageResult;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const HEADER: &str = "timestamp,kind,partition,page,item";

/// Diagnostics CSV writer
#[derive(Debug, Clone)]
pub struct DiagnosticsLog {
    path: PathBuf,
}

impl DiagnosticsLog {
    /// Opens the log at `path`, writing the header if the file is new
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let fresh = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if fresh {
            writeln!(file, "{}", HEADER)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one failure line
    pub fn record(
        &self,
        kind: &str,
        partition: &Partition,
        page: u32,
        item: Option<usize>,
    ) -> StorageResult<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let item = item.map(|i| i.to_string()).unwrap_or_default();
        writeln!(
            file,
            "{},{},{},{},{}",
            Utc::now().to_rfc3339(),
            kind,
            partition.slug(),
            page,
            item
        )?;
        Ok(())
    }
}

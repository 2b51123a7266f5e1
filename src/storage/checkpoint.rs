//! File-backed checkpoint markers
//!
//! Three small files live in the state directory:
//!
//! - `completed_partitions.log`: append-only, one `facet,lower,upper` line per
//!   completed partition, synced after every append
//! - `page_cursor.json`: the in-progress cursor, replaced through a temp file
//! - `partition_space.sha256`: fingerprint of the planned partition list

use crate::state::{Checkpoint, PageCursor, Partition};
use crate::storage::traits::{CheckpointStore, StorageResult};
use crate::storage::write_atomic;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const COMPLETED_LOG: &str = "completed_partitions.log";
const CURSOR_FILE: &str = "page_cursor.json";
const FINGERPRINT_FILE: &str = "partition_space.sha256";
const CORRUPT_LOG: &str = "completed_partitions.log.corrupt";

/// Checkpoint store writing plain marker files under one directory
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Opens (creating if needed) the state directory
    ///
    /// A completion log whose last line was torn by a crash is truncated back
    /// to its last full line so later appends start on a clean line. A log
    /// with any other unreadable line is moved aside to
    /// `completed_partitions.log.corrupt` and a fresh log is started.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory holding the marker files
    ///
    /// # Returns
    ///
    /// * `Ok(FileCheckpointStore)` - Store ready for reads and writes
    /// * `Err(StorageError)` - The directory or log could not be prepared
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        let store = Self {
            dir: dir.to_path_buf(),
        };
        store.repair_torn_tail()?;
        store.quarantine_malformed_log()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads the completed set and resumable cursor together
    pub fn checkpoint(&self) -> StorageResult<Checkpoint> {
        Ok(Checkpoint {
            completed: self.load_completed_partitions()?,
            cursor: self.load_page_cursor()?,
        })
    }

    /// Removes every marker so the next run starts from scratch
    pub fn reset(&mut self) -> StorageResult<()> {
        for name in [COMPLETED_LOG, CURSOR_FILE, FINGERPRINT_FILE] {
            remove_if_exists(&self.dir.join(name))?;
        }
        tracing::info!("Cleared checkpoint markers in {}", self.dir.display());
        Ok(())
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(COMPLETED_LOG)
    }

    fn cursor_path(&self) -> PathBuf {
        self.dir.join(CURSOR_FILE)
    }

    fn fingerprint_path(&self) -> PathBuf {
        self.dir.join(FINGERPRINT_FILE)
    }

    fn repair_torn_tail(&self) -> StorageResult<()> {
        let path = self.log_path();
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if content.is_empty() || content.ends_with(b"\n") {
            return Ok(());
        }

        let keep = content
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        tracing::warn!(
            "Discarding torn trailing line in {} ({} bytes)",
            path.display(),
            content.len() - keep
        );

        let file = OpenOptions::new().write(true).open(&path)?;
        file.set_len(keep as u64)?;
        file.sync_all()?;
        Ok(())
    }

    /// Moves a log with malformed lines out of the way
    ///
    /// Appends after a bad line would otherwise never be honored.
    fn quarantine_malformed_log(&self) -> StorageResult<()> {
        let path = self.log_path();
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let readable = std::str::from_utf8(&content)
            .map(|text| {
                text.lines().all(|line| {
                    let line = line.trim_end_matches('\r');
                    line.trim().is_empty() || Partition::from_marker(line).is_some()
                })
            })
            .unwrap_or(false);
        if readable {
            return Ok(());
        }

        let aside = self.dir.join(CORRUPT_LOG);
        tracing::warn!(
            "Completion log {} is malformed; moved to {} and starting from no prior progress",
            path.display(),
            aside.display()
        );
        fs::rename(&path, &aside)?;
        sync_dir(&self.dir);
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load_completed_partitions(&self) -> StorageResult<BTreeSet<Partition>> {
        let path = self.log_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(
                    "Completion log {} is not valid UTF-8; assuming no prior progress",
                    path.display()
                );
                return Ok(BTreeSet::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_completion_log(&content, &path))
    }

    fn load_page_cursor(&self) -> StorageResult<Option<PageCursor>> {
        let path = self.cursor_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!("Ignoring unreadable page cursor {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<PageCursor>(&content) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed page cursor {}: {}",
                    path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    fn record_partition_complete(&mut self, partition: &Partition) -> StorageResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(file, "{}", partition.to_marker())?;
        file.sync_all()?;
        sync_dir(&self.dir);
        Ok(())
    }

    fn record_page_progress(&mut self, cursor: &PageCursor) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(cursor)?;
        write_atomic(&self.cursor_path(), &json)?;
        Ok(())
    }

    fn clear_page_cursor(&mut self) -> StorageResult<()> {
        remove_if_exists(&self.cursor_path())?;
        Ok(())
    }

    fn swap_partition_fingerprint(&mut self, fingerprint: &str) -> StorageResult<Option<String>> {
        let path = self.fingerprint_path();
        let previous = match fs::read_to_string(&path) {
            Ok(content) => Some(content.trim().to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        write_atomic(&path, format!("{}\n", fingerprint).as_bytes())?;
        Ok(previous)
    }
}

/// Parses completion log lines
///
/// Blank lines are skipped. An unterminated last line is a torn append and is
/// dropped; any other unreadable line invalidates the whole log.
fn parse_completion_log(content: &str, path: &Path) -> BTreeSet<Partition> {
    let terminated = content.ends_with('\n');
    let lines: Vec<&str> = content.split('\n').collect();
    let last_index = lines.len().saturating_sub(1);

    let mut completed = BTreeSet::new();
    for (index, line) in lines.iter().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match Partition::from_marker(line) {
            Some(partition) if terminated || index < last_index => {
                completed.insert(partition);
            }
            _ if !terminated && index == last_index => {
                tracing::warn!(
                    "Ignoring torn trailing line in {}: {:?}",
                    path.display(),
                    line
                );
            }
            _ => {
                tracing::warn!(
                    "Malformed line {} in {}: {:?}; assuming no prior progress",
                    index + 1,
                    path.display(),
                    line
                );
                return BTreeSet::new();
            }
        }
    }
    completed
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Best-effort directory sync so a new file's entry survives a crash
pub(crate) fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

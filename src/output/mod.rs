//! Output module for records and run reporting
//!
//! This module handles:
//! - The extracted item record type
//! - The in-memory record buffer and its threshold flushing
//! - Run summaries and checkpoint status
//! - Progress events for logs and the live terminal indicator

mod buffer;
pub mod progress;
mod record;
pub mod stats;

pub use buffer::RecordBuffer;
pub use progress::{ConsoleReporter, CrawlEvent, CrawlReporter, SpinnerWriter, TracingReporter};
pub use record::{ItemRecord, SpecsStatus};
pub use stats::{print_status, print_summary, CheckpointStatus, RunSummary};

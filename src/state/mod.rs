//! State module for tracking crawl progress
//!
//! This module provides the data model shared by the planner, walker and coordinator.
//!
//! # Components
//!
//! - `Partition`: One facet value plus a half-open numeric range
//! - `PageCursor`: Position of a walk inside a partition, persisted after each page
//! - `Checkpoint`: Completed partitions plus the optional in-progress cursor
//! - `PartitionPhase`: Coordinator state machine over a single partition
//! - `RateState`: Pacing state owned by the rate controller

mod cursor;
mod partition;
mod phase;
mod rate_state;

// Re-export main types
pub use cursor::{Checkpoint, PageCursor};
pub use partition::{NumericRange, Partition};
pub use phase::PartitionPhase;
pub use rate_state::{CooldownCounts, CooldownKind, RateState};

/// Partition lifecycle phases driven by the coordinator
///
/// The happy path is `Start -> DiscoverPageCount -> WalkPages -> FlushAndCommit -> Done`.
/// `WalkPages` may loop on itself after a recovered error; `Failed` is reachable
/// only from `Start` and `DiscoverPageCount`; `Cancelled` from `DiscoverPageCount`
/// and `WalkPages`.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionPhase {
    // ===== Active Phases =====
    /// Partition selected, buffer and walker being prepared
    Start,

    /// Fetching the first listing page to learn the declared last page
    DiscoverPageCount,

    /// Walking listing pages and items
    WalkPages,

    /// Force-flushing the buffer, then recording completion
    FlushAndCommit,

    // ===== Terminal Phases =====
    /// Partition flushed and marked complete
    Done,

    /// Partition attempt aborted before any page was walked
    Failed,

    /// Operator stop observed; buffer flushed and cursor saved
    Cancelled,
}

impl PartitionPhase {
    /// Returns true if this is a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Returns true if the coordinator may move from `self` to `next`
    pub fn can_transition_to(&self, next: PartitionPhase) -> bool {
        use PartitionPhase::*;
        matches!(
            (self, next),
            (Start, DiscoverPageCount)
                | (Start, Failed)
                | (DiscoverPageCount, WalkPages)
                | (DiscoverPageCount, Failed)
                | (DiscoverPageCount, Cancelled)
                | (WalkPages, WalkPages)
                | (WalkPages, FlushAndCommit)
                | (WalkPages, Cancelled)
                | (FlushAndCommit, Done)
        )
    }

    /// Short lowercase label used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::DiscoverPageCount => "discover_page_count",
            Self::WalkPages => "walk_pages",
            Self::FlushAndCommit => "flush_and_commit",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PartitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

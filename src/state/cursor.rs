//! Page cursor and checkpoint snapshot types

use crate::state::Partition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Position of a walk inside one partition
///
/// `page` is the next page that still has unprocessed stubs and `next_item`
/// is the number of stubs on that page already handled. The item counters
/// are partition-scoped and keep batch names unique across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub partition: Partition,

    /// Next page to walk (1-based)
    pub page: u32,

    /// Last page declared by the listing, once discovered
    pub last_page: Option<u32>,

    /// Stubs already processed on `page`
    #[serde(default)]
    pub next_item: usize,

    /// Item stubs seen in this partition, including excluded and failed ones
    #[serde(default)]
    pub items_seen: u64,

    /// Value of `items_seen` covered by the most recent flushed batch
    #[serde(default)]
    pub flushed_through: u64,
}

impl PageCursor {
    /// Cursor for a partition that has not been walked yet
    pub fn start(partition: Partition) -> Self {
        Self {
            partition,
            page: 1,
            last_page: None,
            next_item: 0,
            items_seen: 0,
            flushed_through: 0,
        }
    }

    /// Cursor to resume from after a restart
    ///
    /// Records between the last flush and the interruption were never made
    /// durable, so the flush mark is moved up to the seen counter. That keeps
    /// the next batch range disjoint from every batch already written.
    pub fn resumed(mut self) -> Self {
        self.flushed_through = self.items_seen;
        self
    }

    /// Skips stubs a batch already covers beyond this cursor
    ///
    /// A crash between a batch write and the following cursor write leaves
    /// the batch ahead of the saved cursor. Every stub advances the counter
    /// by one and batches only end inside the cursor's page, so the gap is
    /// the number of stubs on `page` to skip.
    pub fn catch_up(mut self, durable_through: u64) -> Self {
        if durable_through > self.items_seen {
            let gap = durable_through - self.items_seen;
            self.next_item += gap as usize;
            self.items_seen = durable_through;
            self.flushed_through = durable_through;
        }
        self
    }

    /// Moves the cursor to the start of the following page
    pub fn advance_page(&mut self) {
        self.page += 1;
        self.next_item = 0;
    }

    /// Returns true if `page` lies beyond the declared last page or the cap
    pub fn is_exhausted(&self, page_cap: u32) -> bool {
        self.page > page_cap || self.last_page.is_some_and(|last| self.page > last)
    }
}

/// Durable progress as read back at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub completed: BTreeSet<Partition>,
    pub cursor: Option<PageCursor>,
}

impl Checkpoint {
    /// Returns the cursor only if it belongs to an unfinished partition
    pub fn resumable_cursor(&self) -> Option<&PageCursor> {
        self.cursor
            .as_ref()
            .filter(|cursor| !self.completed.contains(&cursor.partition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_cursor() {
        let cursor = PageCursor::start(Partition::new("SUV", 0, 1000));
        assert_eq!(cursor.page, 1);
        assert_eq!(cursor.last_page, None);
        assert_eq!(cursor.items_seen, 0);
    }

    #[test]
    fn test_exhaustion_respects_cap_and_last_page() {
        let mut cursor = PageCursor::start(Partition::new("SUV", 0, 1000));
        cursor.last_page = Some(5);

        cursor.page = 3;
        assert!(!cursor.is_exhausted(3));
        cursor.page = 4;
        assert!(cursor.is_exhausted(3));
        assert!(!cursor.is_exhausted(10));
        cursor.page = 6;
        assert!(cursor.is_exhausted(10));
    }

    #[test]
    fn test_unknown_last_page_bounded_by_cap() {
        let mut cursor = PageCursor::start(Partition::new("SUV", 0, 1000));
        cursor.page = 100;
        assert!(!cursor.is_exhausted(100));
        cursor.page = 101;
        assert!(cursor.is_exhausted(100));
    }

    #[test]
    fn test_resumed_moves_flush_mark() {
        let mut cursor = PageCursor::start(Partition::new("SUV", 0, 1000));
        cursor.items_seen = 42;
        cursor.flushed_through = 26;

        let resumed = cursor.resumed();
        assert_eq!(resumed.flushed_through, 42);
        assert_eq!(resumed.items_seen, 42);
    }

    #[test]
    fn test_catch_up_skips_stubs_in_written_batch() {
        let mut cursor = PageCursor::start(Partition::new("SUV", 0, 1000));
        cursor.page = 2;
        cursor.items_seen = 10;

        let caught_up = cursor.clone().resumed().catch_up(13);
        assert_eq!(caught_up.page, 2);
        assert_eq!(caught_up.next_item, 3);
        assert_eq!(caught_up.items_seen, 13);
        assert_eq!(caught_up.flushed_through, 13);

        let unchanged = cursor.clone().resumed().catch_up(10);
        assert_eq!(unchanged, cursor.resumed());
    }

    #[test]
    fn test_resumable_cursor_ignores_completed_partition() {
        let partition = Partition::new("SUV", 0, 1000);
        let mut checkpoint = Checkpoint {
            completed: BTreeSet::new(),
            cursor: Some(PageCursor::start(partition.clone())),
        };
        assert!(checkpoint.resumable_cursor().is_some());

        checkpoint.completed.insert(partition);
        assert!(checkpoint.resumable_cursor().is_none());
    }

    #[test]
    fn test_cursor_json_defaults() {
        let json = r#"{"partition":{"facet":"SUV","range":{"lower":0,"upper":1000}},"page":4,"last_page":9}"#;
        let cursor: PageCursor = serde_json::from_str(json).unwrap();
        assert_eq!(cursor.page, 4);
        assert_eq!(cursor.last_page, Some(9));
        assert_eq!(cursor.next_item, 0);
        assert_eq!(cursor.flushed_through, 0);
    }
}

//! Loop and item records
//!
//! A loop is a named command template plus an ordered list of items. Each
//! item is substituted into the template in turn and carries its own durable
//! execution status, which is what makes a run resumable.

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

use super::item_status::ItemStatus;

/// Default value of the reserved loop status attribute.
pub const LOOP_STATUS_ACTIVE: &str = "active";

/// A persisted loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRecord {
    /// Caller-chosen unique identifier
    pub id: String,

    /// Command template containing the placeholder
    pub command: String,

    /// Set once at creation
    pub created_at: NaiveDateTime,

    /// Reserved lifecycle tag, always "active" today
    pub status: String,
}

impl LoopRecord {
    /// Create a new loop record stamped with the current local time.
    ///
    /// The timestamp is kept to microseconds, the precision the store keeps.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            created_at: Local::now().naive_local().trunc_subsecs(6),
            status: LOOP_STATUS_ACTIVE.to_string(),
        }
    }
}

/// A persisted item belonging to a loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Store-assigned row id, never reused
    pub id: i64,
    pub loop_id: String,
    /// Literal text substituted into the command template
    pub item: String,
    pub status: ItemStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Item {
    /// The attribute set a copy of this item should be created with.
    pub fn to_new_item(&self) -> NewItem {
        NewItem {
            item: self.item.clone(),
            status: self.status,
            attempts: self.attempts,
            last_error: self.last_error.clone(),
        }
    }
}

/// Attributes of an item about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub item: String,
    pub status: ItemStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl NewItem {
    /// A fresh, never attempted item.
    pub fn pending(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            status: ItemStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

/// New execution state for an existing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdate {
    pub status: ItemStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ItemUpdate {
    /// Transition for a command that exited 0.
    pub fn success(item: &Item) -> Self {
        Self {
            status: ItemStatus::Success,
            attempts: item.attempts,
            last_error: item.last_error.clone(),
        }
    }

    /// Transition for a command that exited non-zero.
    pub fn failed(item: &Item, exit_code: i32) -> Self {
        Self {
            status: ItemStatus::Failed,
            attempts: item.attempts + 1,
            last_error: Some(format!("Command failed with exit code {}", exit_code)),
        }
    }
}

/// Aggregate item counts for a loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub pending: usize,
    pub failed: usize,
    pub success: usize,
    pub total: usize,
}

impl Progress {
    /// Tally the statuses of a set of items.
    pub fn from_items(items: &[Item]) -> Self {
        let mut progress = Self {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Pending => progress.pending += 1,
                ItemStatus::Failed => progress.failed += 1,
                ItemStatus::Success => progress.success += 1,
            }
        }
        progress
    }

    /// True when the loop has items and every one of them succeeded.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.pending == 0 && self.failed == 0
    }

    /// The (pending, failed, success, total) tuple.
    pub fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (self.pending, self.failed, self.success, self.total)
    }
}

/// A loop as shown by `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSummary {
    pub id: String,
    pub command: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub progress: Progress,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(status: ItemStatus, attempts: u32) -> Item {
        Item {
            id: 1,
            loop_id: "l".to_string(),
            item: "a".to_string(),
            status,
            attempts,
            last_error: None,
        }
    }

    #[test]
    fn test_new_loop_record_is_active() {
        let record = LoopRecord::new("batch", "echo {}");
        assert_eq!(record.id, "batch");
        assert_eq!(record.command, "echo {}");
        assert_eq!(record.status, "active");
    }

    #[test]
    fn test_new_item_pending() {
        let new_item = NewItem::pending("a");
        assert_eq!(new_item.status, ItemStatus::Pending);
        assert_eq!(new_item.attempts, 0);
        assert!(new_item.last_error.is_none());
    }

    #[test]
    fn test_failed_update_increments_attempts() {
        let update = ItemUpdate::failed(&item(ItemStatus::Pending, 2), 3);
        assert_eq!(update.status, ItemStatus::Failed);
        assert_eq!(update.attempts, 3);
        assert_eq!(update.last_error.as_deref(), Some("Command failed with exit code 3"));
    }

    #[test]
    fn test_success_update_keeps_attempts() {
        let update = ItemUpdate::success(&item(ItemStatus::Pending, 2));
        assert_eq!(update.status, ItemStatus::Success);
        assert_eq!(update.attempts, 2);
    }

    #[test]
    fn test_progress_from_items() {
        let items = vec![
            item(ItemStatus::Pending, 0),
            item(ItemStatus::Failed, 1),
            item(ItemStatus::Success, 0),
            item(ItemStatus::Success, 0),
        ];
        let progress = Progress::from_items(&items);
        assert_eq!(progress.as_tuple(), (1, 1, 2, 4));
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_progress_complete() {
        let progress = Progress::from_items(&[item(ItemStatus::Success, 0)]);
        assert!(progress.is_complete());
        assert!(!Progress::default().is_complete());
    }

    #[test]
    fn test_to_new_item_copies_state() {
        let mut original = item(ItemStatus::Failed, 4);
        original.last_error = Some("boom".to_string());
        let copy = original.to_new_item();
        assert_eq!(copy.status, ItemStatus::Failed);
        assert_eq!(copy.attempts, 4);
        assert_eq!(copy.last_error.as_deref(), Some("boom"));
    }
}

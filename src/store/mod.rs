//! Storage layer for Loopy.
//!
//! The execution engine and lifecycle operations depend only on the
//! [`LoopStore`] repository trait. Two implementations ship with the crate:
//! - [`SqliteStore`]: the durable store backing the CLI
//! - [`MemoryStore`]: an in-memory fake used by tests
//!
//! Every method is a single read-modify-write unit. A call returns only after
//! its change is committed.
//!
//! # Example
//!
//! ```ignore
//! use loopy::domain::{LoopRecord, NewItem};
//! use loopy::store::{LoopStore, SqliteStore};
//!
//! let store = SqliteStore::open("/tmp/loopy.sqlite")?;
//! store.insert_loop(&LoopRecord::new("batch", "echo {}"), &[NewItem::pending("a")])?;
//! let items = store.get_items("batch")?;
//! ```

mod memory;
mod sqlite;

use crate::domain::{Item, ItemUpdate, LoopRecord, NewItem};
use crate::error::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Result of trying to take a loop's run lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// The lock now belongs to the caller
    Acquired,
    /// Another process holds the lock
    HeldBy(u32),
}

/// Repository of loops and their items.
pub trait LoopStore {
    /// Get a loop by id, `None` if absent.
    fn get_loop(&self, id: &str) -> Result<Option<LoopRecord>>;

    /// Insert a loop together with its initial items.
    ///
    /// Fails with `LoopExists` without touching the store if the id is taken.
    fn insert_loop(&self, record: &LoopRecord, items: &[NewItem]) -> Result<()>;

    /// Delete a loop and every item it owns.
    fn delete_loop(&self, id: &str) -> Result<()>;

    /// Replace a loop's command template.
    fn update_loop_command(&self, id: &str, command: &str) -> Result<()>;

    /// All loops, most recently created first.
    fn list_loops(&self) -> Result<Vec<LoopRecord>>;

    /// Items of a loop in insertion order; empty if the loop is absent.
    fn get_items(&self, loop_id: &str) -> Result<Vec<Item>>;

    /// Append one pending item, returning its id.
    fn create_item(&self, loop_id: &str, item: &str) -> Result<i64>;

    /// Append pending items in order.
    fn append_items(&self, loop_id: &str, items: &[String]) -> Result<()>;

    /// Drop every item of the loop and insert `items` fresh as pending.
    fn replace_items(&self, loop_id: &str, items: &[String]) -> Result<()>;

    /// Set every item back to pending with no attempts and no error.
    fn reset_items(&self, loop_id: &str) -> Result<()>;

    /// Delete a single item. Deleting an absent item is not an error.
    fn delete_item(&self, id: i64) -> Result<()>;

    /// Record the execution state of an item.
    fn update_item(&self, id: i64, update: &ItemUpdate) -> Result<()>;

    /// Try to take the exclusive run lock for a loop on behalf of `pid`.
    fn acquire_run_lock(&self, loop_id: &str, pid: u32) -> Result<LockAttempt>;

    /// Release the run lock if, and only if, it is held by `pid`.
    fn release_run_lock(&self, loop_id: &str, pid: u32) -> Result<()>;
}

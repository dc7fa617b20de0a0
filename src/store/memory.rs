//! In-memory loop store.
//!
//! Behaves like [`super::SqliteStore`] without touching disk. It also counts
//! committed writes so tests can assert that an operation left the store alone.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{LockAttempt, LoopStore};
use crate::domain::{Item, ItemStatus, ItemUpdate, LoopRecord, NewItem};
use crate::error::{LoopyError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    /// Loops in creation order
    loops: Vec<LoopRecord>,
    /// Items across all loops in insertion order
    items: Vec<Item>,
    locks: HashMap<String, u32>,
    last_item_id: i64,
    writes: usize,
}

impl MemoryState {
    fn require_loop(&self, id: &str) -> Result<()> {
        if self.loops.iter().any(|l| l.id == id) {
            Ok(())
        } else {
            Err(LoopyError::LoopNotFound(id.to_string()))
        }
    }

    fn push_item(&mut self, loop_id: &str, item: &NewItem) -> i64 {
        self.last_item_id += 1;
        self.items.push(Item {
            id: self.last_item_id,
            loop_id: loop_id.to_string(),
            item: item.item.clone(),
            status: item.status,
            attempts: item.attempts,
            last_error: item.last_error.clone(),
        });
        self.last_item_id
    }
}

/// Loop store kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write operations committed so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LoopStore for MemoryStore {
    fn get_loop(&self, id: &str) -> Result<Option<LoopRecord>> {
        Ok(self.lock().loops.iter().find(|l| l.id == id).cloned())
    }

    fn insert_loop(&self, record: &LoopRecord, items: &[NewItem]) -> Result<()> {
        let mut state = self.lock();
        if state.loops.iter().any(|l| l.id == record.id) {
            return Err(LoopyError::LoopExists(record.id.clone()));
        }
        state.loops.push(record.clone());
        for item in items {
            state.push_item(&record.id, item);
        }
        state.writes += 1;
        Ok(())
    }

    fn delete_loop(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.require_loop(id)?;
        state.loops.retain(|l| l.id != id);
        state.items.retain(|i| i.loop_id != id);
        state.locks.remove(id);
        state.writes += 1;
        Ok(())
    }

    fn update_loop_command(&self, id: &str, command: &str) -> Result<()> {
        let mut state = self.lock();
        let record = state
            .loops
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| LoopyError::LoopNotFound(id.to_string()))?;
        record.command = command.to_string();
        state.writes += 1;
        Ok(())
    }

    fn list_loops(&self) -> Result<Vec<LoopRecord>> {
        let mut loops: Vec<LoopRecord> = self.lock().loops.iter().rev().cloned().collect();
        // Stable sort keeps newest-inserted first among equal timestamps.
        loops.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(loops)
    }

    fn get_items(&self, loop_id: &str) -> Result<Vec<Item>> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.loop_id == loop_id)
            .cloned()
            .collect())
    }

    fn create_item(&self, loop_id: &str, item: &str) -> Result<i64> {
        let mut state = self.lock();
        state.require_loop(loop_id)?;
        let id = state.push_item(loop_id, &NewItem::pending(item));
        state.writes += 1;
        Ok(id)
    }

    fn append_items(&self, loop_id: &str, items: &[String]) -> Result<()> {
        let mut state = self.lock();
        state.require_loop(loop_id)?;
        for item in items {
            state.push_item(loop_id, &NewItem::pending(item.as_str()));
        }
        state.writes += 1;
        Ok(())
    }

    fn replace_items(&self, loop_id: &str, items: &[String]) -> Result<()> {
        let mut state = self.lock();
        state.require_loop(loop_id)?;
        state.items.retain(|i| i.loop_id != loop_id);
        for item in items {
            state.push_item(loop_id, &NewItem::pending(item.as_str()));
        }
        state.writes += 1;
        Ok(())
    }

    fn reset_items(&self, loop_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.require_loop(loop_id)?;
        for item in state.items.iter_mut().filter(|i| i.loop_id == loop_id) {
            item.status = ItemStatus::Pending;
            item.attempts = 0;
            item.last_error = None;
        }
        state.writes += 1;
        Ok(())
    }

    fn delete_item(&self, id: i64) -> Result<()> {
        let mut state = self.lock();
        state.items.retain(|i| i.id != id);
        state.writes += 1;
        Ok(())
    }

    fn update_item(&self, id: i64, update: &ItemUpdate) -> Result<()> {
        let mut state = self.lock();
        let item = state
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(LoopyError::ItemNotFound(id))?;
        item.status = update.status;
        item.attempts = update.attempts;
        item.last_error = update.last_error.clone();
        state.writes += 1;
        Ok(())
    }

    fn acquire_run_lock(&self, loop_id: &str, pid: u32) -> Result<LockAttempt> {
        let mut state = self.lock();
        state.require_loop(loop_id)?;
        if let Some(holder) = state.locks.get(loop_id) {
            return Ok(LockAttempt::HeldBy(*holder));
        }
        state.locks.insert(loop_id.to_string(), pid);
        state.writes += 1;
        Ok(LockAttempt::Acquired)
    }

    fn release_run_lock(&self, loop_id: &str, pid: u32) -> Result<()> {
        let mut state = self.lock();
        if state.locks.get(loop_id) == Some(&pid) {
            state.locks.remove(loop_id);
            state.writes += 1;
        }
        Ok(())
    }
}

//! Loop Manager implementation
//!
//! LoopManager owns the store and implements every lifecycle operation on
//! loops and their items. Execution is delegated to [`LoopRunner`].

use std::sync::Arc;

use log::info;
use tokio_util::sync::CancellationToken;

use crate::domain::{Item, LoopRecord, LoopSummary, NewItem, Progress, ensure_placeholder};
use crate::error::{LoopyError, Result};
use crate::runner::{CommandExecutor, LoopRunner, RunOutcome};
use crate::store::LoopStore;

/// Manages loop lifecycle on top of a store
pub struct LoopManager<S: LoopStore> {
    store: Arc<S>,
}

impl<S: LoopStore> LoopManager<S> {
    /// Create a new LoopManager over the given store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check if a loop exists
    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.store.get_loop(id)?.is_some())
    }

    /// Get a loop by id
    pub fn get(&self, id: &str) -> Result<Option<LoopRecord>> {
        self.store.get_loop(id)
    }

    /// Create a loop with its initial items.
    ///
    /// The placeholder is appended to `command` when missing, so every item
    /// is substituted somewhere.
    pub fn create(&self, id: &str, command: &str, items: &[String]) -> Result<LoopRecord> {
        let record = LoopRecord::new(id, ensure_placeholder(command));
        let new_items: Vec<NewItem> = items
            .iter()
            .map(|item| NewItem::pending(item.as_str()))
            .collect();
        self.store.insert_loop(&record, &new_items)?;

        info!("Created loop {} with {} items: {}", id, items.len(), record.command);
        Ok(record)
    }

    /// Put every item back to PENDING with no attempts and no error
    pub fn reset(&self, id: &str) -> Result<()> {
        self.store.reset_items(id)?;
        info!("Reset loop {}", id);
        Ok(())
    }

    /// Delete a loop and all of its items
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_loop(id)?;
        info!("Deleted loop {}", id);
        Ok(())
    }

    /// Replace the command template without touching items
    pub fn update_command(&self, id: &str, command: &str) -> Result<()> {
        let command = ensure_placeholder(command);
        self.store.update_loop_command(id, &command)?;
        info!("Updated command of loop {}: {}", id, command);
        Ok(())
    }

    /// Snapshot `source_id` into a new loop `target_id`.
    ///
    /// Items keep their status, attempts and last error.
    pub fn copy_to(&self, source_id: &str, target_id: &str) -> Result<LoopRecord> {
        let source = self
            .store
            .get_loop(source_id)?
            .ok_or_else(|| LoopyError::LoopNotFound(source_id.to_string()))?;
        if self.exists(target_id)? {
            return Err(LoopyError::LoopExists(target_id.to_string()));
        }

        let items: Vec<NewItem> = self
            .store
            .get_items(source_id)?
            .iter()
            .map(Item::to_new_item)
            .collect();
        let record = LoopRecord::new(target_id, source.command);
        self.store.insert_loop(&record, &items)?;

        info!("Copied loop {} to {} ({} items)", source_id, target_id, items.len());
        Ok(record)
    }

    /// Append new pending items
    pub fn add_items(&self, id: &str, items: &[String]) -> Result<()> {
        self.store.append_items(id, items)?;
        info!("Added {} items to loop {}", items.len(), id);
        Ok(())
    }

    /// Discard every item and insert `items` fresh as pending
    pub fn replace_items(&self, id: &str, items: &[String]) -> Result<()> {
        self.store.replace_items(id, items)?;
        info!("Replaced items of loop {} with {} items", id, items.len());
        Ok(())
    }

    /// Items in insertion order; empty when the loop does not exist
    pub fn list_items(&self, id: &str) -> Result<Vec<Item>> {
        self.store.get_items(id)
    }

    /// Item counts; all zero when the loop does not exist
    pub fn get_progress(&self, id: &str) -> Result<Progress> {
        Ok(Progress::from_items(&self.store.get_items(id)?))
    }

    /// Every loop with its progress, most recently created first
    pub fn list_all(&self) -> Result<Vec<LoopSummary>> {
        self.store
            .list_loops()?
            .into_iter()
            .map(|record| {
                let progress = self.get_progress(&record.id)?;
                Ok(LoopSummary {
                    id: record.id,
                    command: record.command,
                    status: record.status,
                    created_at: record.created_at,
                    progress,
                })
            })
            .collect()
    }

    /// Delete every loop whose items all succeeded. Returns the deleted ids.
    pub fn clean_completed(&self) -> Result<Vec<String>> {
        let mut cleaned = Vec::new();
        for summary in self.list_all()? {
            if summary.progress.is_complete() {
                self.delete(&summary.id)?;
                cleaned.push(summary.id);
            }
        }
        Ok(cleaned)
    }

    /// Run the pending items of a loop with `executor`
    pub async fn run<E: CommandExecutor>(
        &self,
        id: &str,
        continue_on_failure: bool,
        executor: &E,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        LoopRunner::new(self.store.as_ref(), executor)
            .run(id, continue_on_failure, cancel)
            .await
    }
}

//! Loop runner implementation - executes the pending items of a loop.
//!
//! Each pass:
//! 1. Loads the loop and its PENDING items (terminal items are skipped)
//! 2. Takes the loop's run lock
//! 3. For each pending item, renders the command and hands it to the executor
//! 4. Commits SUCCESS or FAILED for the item before moving on
//! 5. Stops at the first failure unless asked to continue
//!
//! A crash or interruption therefore leaves processed items terminal and the
//! rest PENDING, and the next run picks up exactly where this one stopped.

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio_util::sync::CancellationToken;

use super::executor::{CommandExecutor, ExecOutcome};
use crate::domain::{Item, ItemUpdate, render_command};
use crate::error::{LoopyError, Result};
use crate::store::{LockAttempt, LoopStore};

/// Outcome of a run pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item processed in this pass succeeded
    Complete { processed: usize },
    /// At least one item failed during this pass
    Failed { processed: usize, failed: usize },
    /// A termination request arrived while `item` was running
    Interrupted { item: String },
}

impl RunOutcome {
    /// True only when no item failed and the pass was not interrupted.
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Complete { .. })
    }
}

/// LoopRunner drives one loop's pending items through an executor.
pub struct LoopRunner<'a, S, E>
where
    S: LoopStore,
    E: CommandExecutor,
{
    store: &'a S,
    executor: &'a E,
    /// Recorded as the run lock holder
    pid: u32,
}

impl<'a, S, E> LoopRunner<'a, S, E>
where
    S: LoopStore,
    E: CommandExecutor,
{
    /// Create a runner holding locks on behalf of the current process.
    pub fn new(store: &'a S, executor: &'a E) -> Self {
        Self {
            store,
            executor,
            pid: std::process::id(),
        }
    }

    /// Run every pending item of `loop_id` in insertion order.
    ///
    /// Returns `LoopNotFound` if the loop does not exist and `LoopBusy` if
    /// another live process is running it. A loop with nothing pending is a
    /// no-op that reports success without writing to the store.
    pub async fn run(
        &self,
        loop_id: &str,
        continue_on_failure: bool,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let record = self
            .store
            .get_loop(loop_id)?
            .ok_or_else(|| LoopyError::LoopNotFound(loop_id.to_string()))?;

        if self.pending_items(loop_id)?.is_empty() {
            info!("No pending items for loop {}", loop_id);
            return Ok(RunOutcome::Complete { processed: 0 });
        }

        let _lock = RunLock::acquire(self.store, loop_id, self.pid)?;

        // Re-read under the lock in case another run finished items meanwhile.
        let pending = self.pending_items(loop_id)?;
        info!("Running loop {} with {} pending items", loop_id, pending.len());

        let mut processed = 0;
        let mut failed = 0;

        for item in pending {
            if cancel.is_cancelled() {
                warn!("Loop {} interrupted before item {:?}", loop_id, item.item);
                return Ok(RunOutcome::Interrupted { item: item.item });
            }

            let command = render_command(&record.command, &item.item);
            debug!("Item {:?}: {}", item.item, command);

            match self.executor.execute(&item.item, &command, cancel).await? {
                ExecOutcome::Cancelled => {
                    warn!("Loop {} interrupted while running item {:?}", loop_id, item.item);
                    return Ok(RunOutcome::Interrupted { item: item.item });
                }
                ExecOutcome::Exited(0) => {
                    self.store.update_item(item.id, &ItemUpdate::success(&item))?;
                    processed += 1;
                }
                ExecOutcome::Exited(code) => {
                    self.store.update_item(item.id, &ItemUpdate::failed(&item, code))?;
                    processed += 1;
                    failed += 1;
                    warn!(
                        "Item {:?} of loop {} failed with exit code {}",
                        item.item, loop_id, code
                    );

                    if !continue_on_failure {
                        break;
                    }
                }
            }
        }

        info!(
            "Loop {} pass finished: {} processed, {} failed",
            loop_id, processed, failed
        );
        if failed == 0 {
            Ok(RunOutcome::Complete { processed })
        } else {
            Ok(RunOutcome::Failed { processed, failed })
        }
    }

    fn pending_items(&self, loop_id: &str) -> Result<Vec<Item>> {
        Ok(self
            .store
            .get_items(loop_id)?
            .into_iter()
            .filter(|item| !item.status.is_terminal())
            .collect())
    }
}

/// Exclusive run lock on a loop, released on drop.
struct RunLock<'a, S: LoopStore> {
    store: &'a S,
    loop_id: String,
    pid: u32,
}

impl<'a, S: LoopStore> RunLock<'a, S> {
    /// Take the lock, reclaiming it from a holder that is no longer alive.
    fn acquire(store: &'a S, loop_id: &str, pid: u32) -> Result<Self> {
        match store.acquire_run_lock(loop_id, pid)? {
            LockAttempt::Acquired => {}
            LockAttempt::HeldBy(holder) if holder != pid && !process_alive(holder) => {
                warn!("Reclaiming run lock on loop {} from dead process {}", loop_id, holder);
                store.release_run_lock(loop_id, holder)?;
                if let LockAttempt::HeldBy(holder) = store.acquire_run_lock(loop_id, pid)? {
                    return Err(LoopyError::LoopBusy {
                        id: loop_id.to_string(),
                        pid: holder,
                    });
                }
            }
            LockAttempt::HeldBy(holder) => {
                return Err(LoopyError::LoopBusy {
                    id: loop_id.to_string(),
                    pid: holder,
                });
            }
        }

        Ok(Self {
            store,
            loop_id: loop_id.to_string(),
            pid,
        })
    }
}

impl<S: LoopStore> Drop for RunLock<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_run_lock(&self.loop_id, self.pid) {
            warn!("Failed to release run lock on loop {}: {}", self.loop_id, e);
        }
    }
}

fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks that the process exists.
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

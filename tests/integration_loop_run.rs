//! End-to-end loop tests
//!
//! Drives the lifecycle manager over an on-disk SQLite store with the real
//! shell executor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use loopy::domain::ItemStatus;
use loopy::error::{LoopyError, Result};
use loopy::manager::LoopManager;
use loopy::runner::{RunOutcome, ShellExecutor};
use loopy::store::SqliteStore;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn open_manager(dir: &TempDir) -> Result<LoopManager<SqliteStore>> {
    let store = SqliteStore::open(dir.path().join("nested").join("db.sqlite"))?;
    Ok(LoopManager::new(Arc::new(store)))
}

fn capture_executor() -> (ShellExecutor, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let executor = ShellExecutor::new("sh", Duration::from_secs(2)).with_sink(lines.clone());
    (executor, lines)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Create, run, and check progress and streamed output
#[tokio::test]
async fn test_create_and_run_to_completion() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = open_manager(&temp_dir)?;
    let (executor, lines) = capture_executor();

    let record = manager.create("L", "echo", &strings(&["a", "b"]))?;
    assert_eq!(record.command, "echo {}");

    let outcome = manager.run("L", false, &executor, &CancellationToken::new()).await?;
    assert_eq!(outcome, RunOutcome::Complete { processed: 2 });
    assert_eq!(manager.get_progress("L")?.as_tuple(), (0, 0, 2, 2));
    assert_eq!(*lines.lock().unwrap(), strings(&["a: a", "b: b"]));

    // A second pass has nothing left to do
    let outcome = manager.run("L", false, &executor, &CancellationToken::new()).await?;
    assert_eq!(outcome, RunOutcome::Complete { processed: 0 });
    assert_eq!(lines.lock().unwrap().len(), 2);

    Ok(())
}

/// Stop at the first failure, then resume after fixing the command
#[tokio::test]
async fn test_failure_stops_and_resume_continues() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = open_manager(&temp_dir)?;
    let (executor, _lines) = capture_executor();

    manager.create("L", "test {} != a", &strings(&["a", "b"]))?;
    let outcome = manager.run("L", false, &executor, &CancellationToken::new()).await?;
    assert_eq!(outcome, RunOutcome::Failed { processed: 1, failed: 1 });

    let items = manager.list_items("L")?;
    assert_eq!(items[0].status, ItemStatus::Failed);
    assert_eq!(items[0].attempts, 1);
    assert_eq!(items[0].last_error.as_deref(), Some("Command failed with exit code 1"));
    assert_eq!(items[1].status, ItemStatus::Pending);

    // The failed item is terminal, so the next pass only runs "b"
    let outcome = manager.run("L", false, &executor, &CancellationToken::new()).await?;
    assert_eq!(outcome, RunOutcome::Complete { processed: 1 });
    assert_eq!(manager.get_progress("L")?.as_tuple(), (0, 1, 1, 2));

    // Reset and fix the command: everything succeeds
    manager.reset("L")?;
    manager.update_command("L", "true")?;
    let outcome = manager.run("L", false, &executor, &CancellationToken::new()).await?;
    assert!(outcome.is_success());
    assert_eq!(manager.get_progress("L")?.as_tuple(), (0, 0, 2, 2));

    Ok(())
}

#[tokio::test]
async fn test_continue_on_failure() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = open_manager(&temp_dir)?;
    let (executor, _lines) = capture_executor();

    manager.create("L", "test {} != a", &strings(&["a", "b"]))?;
    let outcome = manager.run("L", true, &executor, &CancellationToken::new()).await?;

    assert_eq!(outcome, RunOutcome::Failed { processed: 2, failed: 1 });
    let statuses: Vec<ItemStatus> = manager.list_items("L")?.iter().map(|i| i.status).collect();
    assert_eq!(statuses, vec![ItemStatus::Failed, ItemStatus::Success]);

    Ok(())
}

/// Interrupting a run leaves the running item pending and the loop runnable
#[tokio::test]
async fn test_interrupted_run_is_resumable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = open_manager(&temp_dir)?;
    let (executor, _lines) = capture_executor();

    manager.create("L", "sleep {}", &strings(&["30", "0"]))?;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let outcome = manager.run("L", false, &executor, &cancel).await?;
    assert_eq!(outcome, RunOutcome::Interrupted { item: "30".to_string() });
    assert_eq!(manager.get_progress("L")?.as_tuple(), (2, 0, 0, 2));

    // Lock was released: a fresh run proceeds
    manager.update_command("L", "true {}")?;
    let outcome = manager.run("L", false, &executor, &CancellationToken::new()).await?;
    assert_eq!(outcome, RunOutcome::Complete { processed: 2 });

    Ok(())
}

/// Verify state survives reopening the store
#[tokio::test]
async fn test_state_persists_across_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    {
        let manager = open_manager(&temp_dir)?;
        let (executor, _lines) = capture_executor();
        manager.create("L", "test {} = a", &strings(&["a", "b"]))?;
        manager.run("L", true, &executor, &CancellationToken::new()).await?;
    }

    let manager = open_manager(&temp_dir)?;
    let items = manager.list_items("L")?;
    assert_eq!(items[0].status, ItemStatus::Success);
    assert_eq!(items[1].status, ItemStatus::Failed);
    assert_eq!(manager.get("L")?.map(|l| l.command), Some("test {} = a".to_string()));

    Ok(())
}

#[test]
fn test_copy_replace_delete() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = open_manager(&temp_dir)?;

    manager.create("src", "echo {}", &strings(&["a", "b"]))?;
    manager.copy_to("src", "dst")?;
    assert!(matches!(
        manager.copy_to("src", "dst"),
        Err(LoopyError::LoopExists(_))
    ));

    let before: Vec<i64> = manager.list_items("dst")?.iter().map(|i| i.id).collect();
    manager.replace_items("dst", &strings(&["z", "y", "x"]))?;
    let after = manager.list_items("dst")?;
    assert_eq!(
        after.iter().map(|i| i.item.as_str()).collect::<Vec<_>>(),
        vec!["z", "y", "x"]
    );
    assert!(after.iter().all(|i| !before.contains(&i.id)));
    assert_eq!(manager.list_items("src")?.len(), 2);

    manager.delete("dst")?;
    assert!(manager.get("dst")?.is_none());
    assert!(manager.list_items("dst")?.is_empty());
    assert!(matches!(manager.delete("dst"), Err(LoopyError::LoopNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_clean_removes_only_completed_loops() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let manager = open_manager(&temp_dir)?;
    let (executor, _lines) = capture_executor();

    manager.create("done", "true {}", &strings(&["a"]))?;
    manager.create("broken", "false {}", &strings(&["a"]))?;
    manager.create("empty", "true {}", &[])?;
    manager.run("done", false, &executor, &CancellationToken::new()).await?;
    manager.run("broken", false, &executor, &CancellationToken::new()).await?;

    assert_eq!(manager.clean_completed()?, vec!["done".to_string()]);
    let remaining: Vec<String> = manager.list_all()?.into_iter().map(|s| s.id).collect();
    assert_eq!(remaining, strings(&["empty", "broken"]));

    Ok(())
}

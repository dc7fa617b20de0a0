use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use loopy::config::Config;
use loopy::domain::ItemStatus;
use loopy::manager::LoopManager;
use loopy::runner::{RunOutcome, ShellExecutor};
use loopy::store::SqliteStore;

type Manager = LoopManager<SqliteStore>;

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loopy")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("loopy.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_level = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM.
///
/// Both handlers are installed before returning, so a signal that arrives
/// before the listener task first runs is still seen.
fn spawn_signal_listener(cancel: CancellationToken) -> Result<()> {
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
        cancel.cancel();
    });
    Ok(())
}

fn require_id<'a>(cli: &'a Cli, command: &str) -> Result<&'a str> {
    cli.id
        .as_deref()
        .ok_or_else(|| eyre!("Loop ID required for {} command", command))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    let db_path = config.database_path(cli.db.as_deref())?;
    if cli.is_verbose() {
        eprintln!("{} {}", "Using database".yellow(), db_path.display());
    }
    let store = SqliteStore::open(&db_path)
        .context(format!("Failed to open {}", db_path.display()))?;
    let manager = LoopManager::new(Arc::new(store));

    match &cli.command {
        None | Some(Commands::List) => handle_list_command(&manager),
        Some(Commands::Create { command }) => {
            let id = require_id(cli, "create")?;
            handle_create_command(&manager, id, &cli::command_template(command))
        }
        Some(Commands::Run {
            continue_on_failure,
        }) => {
            let id = require_id(cli, "run")?;
            handle_run_command(&manager, id, *continue_on_failure, config).await
        }
        Some(Commands::Reset) => handle_reset_command(&manager, require_id(cli, "reset")?),
        Some(Commands::Delete) => handle_delete_command(&manager, require_id(cli, "delete")?),
        Some(Commands::EditCmd { command }) => {
            let id = require_id(cli, "edit-cmd")?;
            handle_edit_cmd_command(&manager, id, &cli::command_template(command))
        }
        Some(Commands::CopyFrom { source_id }) => {
            handle_copy_from_command(&manager, source_id, require_id(cli, "copy-from")?)
        }
        Some(Commands::ReadItems { append, replace }) => {
            let id = require_id(cli, "read-items")?;
            handle_read_items_command(&manager, id, *append, *replace)
        }
        Some(Commands::EditItems) => {
            handle_edit_items_command(&manager, require_id(cli, "edit-items")?, config)
        }
        Some(Commands::ListItems { raw }) => {
            handle_list_items_command(&manager, require_id(cli, "list-items")?, *raw)
        }
        Some(Commands::Clean) => handle_clean_command(&manager),
    }
}

fn handle_create_command(manager: &Manager, id: &str, command: &str) -> Result<()> {
    eprintln!("Reading items from standard input");
    let items = cli::read_items(io::stdin().lock())
        .context("Failed to read items from standard input")?;

    manager.create(id, command, &items)?;
    println!("Loop {} created", id);
    Ok(())
}

async fn handle_run_command(
    manager: &Manager,
    id: &str,
    continue_on_failure: bool,
    config: &Config,
) -> Result<()> {
    let executor = ShellExecutor::new(config.runner.shell.clone(), config.runner.kill_grace());
    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone())?;

    let outcome = manager.run(id, continue_on_failure, &executor, &cancel).await?;
    info!("Run of loop {} finished: {:?}", id, outcome);

    match outcome {
        RunOutcome::Complete { processed: 0 } => {
            println!("No pending items for loop {}", id);
            Ok(())
        }
        RunOutcome::Complete { .. } => Ok(()),
        RunOutcome::Failed { processed, failed } => Err(eyre!(
            "Loop {}: {} of {} processed items failed",
            id,
            failed,
            processed
        )),
        RunOutcome::Interrupted { item } => {
            Err(eyre!("Loop {} interrupted while running {}", id, item))
        }
    }
}

fn handle_reset_command(manager: &Manager, id: &str) -> Result<()> {
    manager.reset(id)?;
    println!("Loop {} reset", id);
    Ok(())
}

fn handle_delete_command(manager: &Manager, id: &str) -> Result<()> {
    manager.delete(id)?;
    println!("Loop {} deleted", id);
    Ok(())
}

fn handle_edit_cmd_command(manager: &Manager, id: &str, command: &str) -> Result<()> {
    manager.update_command(id, command)?;
    println!("Loop {} command updated", id);
    Ok(())
}

fn handle_copy_from_command(manager: &Manager, source_id: &str, id: &str) -> Result<()> {
    manager.copy_to(source_id, id)?;
    println!("Loop {} copied to {}", source_id, id);
    Ok(())
}

fn handle_read_items_command(
    manager: &Manager,
    id: &str,
    append: bool,
    replace: bool,
) -> Result<()> {
    match (append, replace) {
        (true, true) => return Err(eyre!("--append and --replace are mutually exclusive")),
        (false, false) => return Err(eyre!("Either --append or --replace must be specified")),
        _ => {}
    }
    if !manager.exists(id)? {
        return Err(loopy::LoopyError::LoopNotFound(id.to_string()).into());
    }

    let items = cli::read_items(io::stdin().lock())
        .context("Failed to read items from standard input")?;
    if items.is_empty() {
        return Err(eyre!("No items provided via stdin"));
    }

    if replace {
        manager.replace_items(id, &items)?;
        println!("Replaced items in loop {}", id);
    } else {
        manager.add_items(id, &items)?;
        println!("Added items to loop {}", id);
    }
    Ok(())
}

fn handle_edit_items_command(manager: &Manager, id: &str, config: &Config) -> Result<()> {
    if !manager.exists(id)? {
        return Err(loopy::LoopyError::LoopNotFound(id.to_string()).into());
    }

    let current: Vec<String> = manager
        .list_items(id)?
        .into_iter()
        .map(|item| item.item)
        .collect();
    let editor = cli::editor::resolve_editor(config.editor.as_deref());

    let Some(edited) = cli::editor::edit_text(&editor, &current.join("\n"))? else {
        println!("Edit cancelled");
        return Ok(());
    };

    manager.replace_items(id, &cli::parse_items(&edited))?;
    println!("Updated items in loop {}", id);
    Ok(())
}

fn handle_list_items_command(manager: &Manager, id: &str, raw: bool) -> Result<()> {
    if !manager.exists(id)? {
        return Err(loopy::LoopyError::LoopNotFound(id.to_string()).into());
    }

    let items = manager.list_items(id)?;
    if items.is_empty() {
        eprintln!("No items found");
        return Ok(());
    }

    for item in items {
        if raw {
            println!("{}", item.item);
            continue;
        }
        match item.status {
            ItemStatus::Pending => println!("  {}", item.item),
            ItemStatus::Success => println!("{}", format!("✓ {}", item.item).green()),
            ItemStatus::Failed => println!(
                "{}",
                format!("✗ {} (failed {} times)", item.item, item.attempts).red()
            ),
        }
    }
    Ok(())
}

fn handle_list_command(manager: &Manager) -> Result<()> {
    let loops = manager.list_all()?;
    if loops.is_empty() {
        println!("No loops found");
        return Ok(());
    }

    for summary in loops {
        let (pending, failed, success, total) = summary.progress.as_tuple();
        println!(
            "{}: {} ({}/{}/{}/{})",
            summary.id, summary.command, pending, failed, success, total
        );
    }
    Ok(())
}

fn handle_clean_command(manager: &Manager) -> Result<()> {
    let cleaned = manager.clean_completed()?;
    for id in &cleaned {
        println!("Cleaned loop {}", id);
    }

    if cleaned.is_empty() {
        println!("No completed loops to clean");
    } else {
        println!("Cleaned {} completed loops", cleaned.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await?;

    Ok(())
}

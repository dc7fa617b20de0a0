//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - create/run/reset/delete: loop lifecycle
//! - edit-cmd/copy-from: change or duplicate a loop
//! - read-items/edit-items/list-items: manage items
//! - list/clean: all loops

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Loopy - run a command for each item, durably and resumably
#[derive(Parser, Debug)]
#[command(name = "loopy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Loop identifier
    #[arg(long, env = "LOOPY_ID", global = true)]
    pub id: Option<String>,

    /// Database path
    #[arg(long, env = "LOOPY_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (defaults to list)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Create a new loop, reading items from standard input
    Create {
        /// Command template; `{}` is replaced by each item. A `{}` argument
        /// is appended unless one of the words is exactly `{}`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run the pending items of a loop
    Run {
        /// Continue processing even if items fail
        #[arg(long)]
        continue_on_failure: bool,
    },

    /// Reset loop to start from beginning
    Reset,

    /// Delete a loop
    Delete,

    /// Update loop command
    EditCmd {
        /// New command template, with `{}` appended as for create
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Copy another loop into this one
    CopyFrom {
        /// Loop to copy from
        source_id: String,
    },

    /// Read items from standard input into the loop
    ReadItems {
        /// Append items to existing loop items
        #[arg(long)]
        append: bool,

        /// Replace all loop items
        #[arg(long)]
        replace: bool,
    },

    /// Edit loop items in a text editor
    EditItems,

    /// List items in a loop
    ListItems {
        /// Print only item names without status
        #[arg(long)]
        raw: bool,
    },

    /// List all loops
    List,

    /// Remove loops where all items are completed
    Clean,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_parse_no_args() {
        // No args should result in None command (list)
        let cli = parse(&["loopy"]);
        assert!(cli.command.is_none());
        assert!(!cli.is_verbose());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_options() {
        let cli = parse(&["loopy", "--id", "batch", "--db", "/tmp/x.sqlite", "-v", "reset"]);
        assert_eq!(cli.id.as_deref(), Some("batch"));
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.sqlite")));
        assert!(cli.is_verbose());
        assert_eq!(cli.command, Some(Commands::Reset));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = parse(&["loopy", "run", "--id", "batch", "--continue-on-failure"]);
        assert_eq!(cli.id.as_deref(), Some("batch"));
        assert_eq!(
            cli.command,
            Some(Commands::Run {
                continue_on_failure: true
            })
        );
    }

    #[test]
    fn test_create_collects_command_words() {
        let cli = parse(&["loopy", "--id", "b", "create", "grep", "-n", "foo", "{}"]);
        match cli.command {
            Some(Commands::Create { command }) => {
                assert_eq!(command, vec!["grep", "-n", "foo", "{}"]);
            }
            _ => panic!("Expected create command"),
        }
    }

    #[test]
    fn test_create_requires_command() {
        assert!(Cli::try_parse_from(["loopy", "create"]).is_err());
        assert!(Cli::try_parse_from(["loopy", "edit-cmd"]).is_err());
    }

    #[test]
    fn test_edit_cmd() {
        let cli = parse(&["loopy", "edit-cmd", "cat"]);
        assert_eq!(
            cli.command,
            Some(Commands::EditCmd {
                command: vec!["cat".to_string()]
            })
        );
    }

    #[test]
    fn test_copy_from() {
        let cli = parse(&["loopy", "copy-from", "other"]);
        assert_eq!(
            cli.command,
            Some(Commands::CopyFrom {
                source_id: "other".to_string()
            })
        );
    }

    #[test]
    fn test_read_items_flags_parse_independently() {
        // Exclusivity is enforced by the handler
        let cli = parse(&["loopy", "read-items", "--append", "--replace"]);
        assert_eq!(
            cli.command,
            Some(Commands::ReadItems {
                append: true,
                replace: true
            })
        );
    }

    #[test]
    fn test_list_items_raw() {
        let cli = parse(&["loopy", "list-items", "--raw"]);
        assert_eq!(cli.command, Some(Commands::ListItems { raw: true }));
    }

    #[test]
    fn test_simple_subcommands() {
        assert_eq!(parse(&["loopy", "delete"]).command, Some(Commands::Delete));
        assert_eq!(parse(&["loopy", "edit-items"]).command, Some(Commands::EditItems));
        assert_eq!(parse(&["loopy", "list"]).command, Some(Commands::List));
        assert_eq!(parse(&["loopy", "clean"]).command, Some(Commands::Clean));
    }

    #[test]
    fn test_help_works() {
        // Verify help doesn't panic
        Cli::command().debug_assert();
    }
}

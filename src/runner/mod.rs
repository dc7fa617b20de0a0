//! Loop runner module - the execution engine.
//!
//! This module provides the core loop execution logic, including:
//! - LoopRunner for running the pending items of a loop
//! - RunOutcome for representing the result of a pass
//! - CommandExecutor / ShellExecutor for supervising item commands

mod executor;
mod loop_runner;

pub use executor::{
    CommandExecutor, DEFAULT_KILL_GRACE, DEFAULT_SHELL, ExecOutcome, OutputSink, ShellExecutor,
    StdoutSink,
};
pub use loop_runner::{LoopRunner, RunOutcome};


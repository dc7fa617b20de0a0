//! Loopy - durable, resumable batch command runner
//!
//! A loop is a command template plus an ordered list of items. Running a loop
//! substitutes each pending item into the template, executes it, and records
//! the result, so an interrupted or failed run can be resumed later.

pub mod config;
pub mod domain;
pub mod error;
pub mod manager;
pub mod runner;
pub mod store;

pub use error::{LoopyError, Result};

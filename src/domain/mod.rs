//! Domain types for Loopy
//!
//! This module contains the core domain types:
//! - LoopRecord: a named command template plus its ordered items
//! - Item: one unit of work with its durable execution status
//! - ItemStatus: the closed PENDING / SUCCESS / FAILED lifecycle
//! - Progress: aggregate item counts for a loop
//! - template: placeholder handling for command templates

pub mod item_status;
pub mod loop_record;
pub mod template;

pub use item_status::ItemStatus;
pub use loop_record::{Item, ItemUpdate, LoopRecord, LoopSummary, NewItem, Progress};
pub use template::{PLACEHOLDER, ensure_placeholder, render_command};

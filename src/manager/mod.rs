//! Loop Manager module
//!
//! Loop lifecycle operations - create, copy, reset, delete, item edits,
//! progress and listing - on top of a [`crate::store::LoopStore`].

mod loop_manager;

pub use loop_manager::LoopManager;

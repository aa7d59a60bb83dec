//! Shared utilities.
//!
//! - [`fs`] - File system operations with atomic writes and safe tree moves

pub mod fs;

pub use fs::{atomic_write, copy_dir, ensure_dir, move_entry, remove_entry_if_exists};

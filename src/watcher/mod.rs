//! File system watching for external config changes.

pub mod digest;
pub mod file;

pub use digest::ContentTracker;
pub use file::ConfigFileWatcher;

use std::time::Duration;

/// Quiet period that must pass after the last event before a reload fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

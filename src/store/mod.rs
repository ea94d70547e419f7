//! Configuration stores.
//!
//! [`CommonStore`] owns the in-memory value, listeners and the load/set
//! pipeline. [`FileStore`] backs it with a file on disk and optionally
//! reloads when that file changes.

pub mod common;
pub mod file;

pub use common::{CommonStore, ListenerId, Snapshot};
pub use file::{FileStore, StoreOptions};

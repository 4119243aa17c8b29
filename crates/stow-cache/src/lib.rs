//! Crash-safe keyed disk cache for stow
//!
//! This crate provides a disk cache that maps string keys to files or
//! directories under a root directory. New content is staged under a
//! timestamped name and published with a single atomic rename, so readers
//! never observe partial writes, even across crashes and concurrent
//! processes. Entries are evicted by creation age.
//!
//! Only Unix-like platforms are supported: publication relies on symbolic
//! links and rename-over-existing.

pub mod layout;
pub mod purge;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export main types
pub use purge::PurgeReport;
pub use store::{Cache, Entry, Transaction, TxState};

use stow_core::error::StowError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, StowError>;

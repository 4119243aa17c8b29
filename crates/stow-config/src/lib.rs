//! Configuration parsing for the stow cache
//!
//! This crate handles parsing and validation of stow.toml files and layers
//! them with environment overrides into a resolved [`StowConfig`] that the
//! cache is opened from.

pub mod merge;
pub mod root;
pub mod toml;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource, StowConfig};
pub use root::default_cache_root;
pub use self::toml::{CacheSection, LogSection, PurgeSection, StowToml};

use stow_core::error::StowError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, StowError>;

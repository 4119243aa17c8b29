//! Utility functions and helpers.
//!
//! Common functionality used across multiple stow crates.

pub mod hash;
pub mod path;

// Re-export commonly used utilities
pub use hash::{Digest, KeyHasher, Sha256Hasher};
pub use path::{confine, is_within, normalize_path};

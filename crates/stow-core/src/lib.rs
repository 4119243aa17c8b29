//! # stow-core
//!
//! Core types and utilities shared across all stow crates.
//!
//! This crate provides:
//! - StowError enum for unified error handling
//! - The Clock abstraction used to stamp and age cache entries
//! - Key hashing (Digest, KeyHasher) that determines on-disk names
//! - Path confinement helpers and the tracing bootstrap
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `error`: Error types and result aliases
//! - `clock`: Wall-clock indirection (system and fake clocks)
//! - `utils`: Hashing and path helpers
//! - `logging`: Subscriber setup for hosts and tests

pub mod clock;
pub mod error;
pub mod logging;
pub mod utils;

// Re-export commonly used types
pub use clock::{Clock, FakeClock, SharedClock, SystemClock};
pub use error::{StowError, StowResult};
pub use utils::{Digest, KeyHasher, Sha256Hasher};

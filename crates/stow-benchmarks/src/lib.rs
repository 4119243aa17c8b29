//! Stow benchmarking suite
//!
//! Benchmarks for publishing, looking up and purging cache entries.

pub mod common;

pub use common::*;

//! Throwaway caches for tests and benchmarks.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use stow_core::FakeClock;
use tempfile::TempDir;

use crate::Cache;

/// A cache rooted in a temporary directory that is deleted on drop
#[derive(Debug)]
pub struct TempCache {
    cache: Cache,
    // Dropped after `cache`
    _dir: TempDir,
}

impl TempCache {
    /// Cache on the system clock.
    ///
    /// Panics if the temporary directory cannot be created.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temporary cache directory");
        let cache = Cache::new(utf8(&dir)).expect("failed to open temporary cache");
        Self { cache, _dir: dir }
    }

    /// Cache driven by a fake clock that starts at the Unix epoch and ticks
    /// `step` per reading
    pub fn with_fake_clock(step: Duration) -> (Self, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(DateTime::<Utc>::from(std::time::UNIX_EPOCH), step));
        let dir = tempfile::tempdir().expect("failed to create temporary cache directory");
        let cache = Cache::with_clock(utf8(&dir), clock.clone()).expect("failed to open temporary cache");
        (Self { cache, _dir: dir }, clock)
    }

    /// The underlying cache
    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}

impl Default for TempCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TempCache {
    type Target = Cache;

    fn deref(&self) -> &Cache {
        &self.cache
    }
}

fn utf8(dir: &TempDir) -> &Utf8Path {
    Utf8Path::from_path(dir.path()).expect("temporary directory path is not valid UTF-8")
}

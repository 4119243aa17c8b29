//! Cache store implementation
//!
//! This module provides the main [`Cache`] interface. A cache is nothing but
//! a root directory; every guarantee comes from the on-disk naming in
//! [`crate::layout`] and the filesystem's atomic rename.

use camino::Utf8Path;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use stow_config::{default_cache_root, StowConfig};
use stow_core::error::StowError;
use stow_core::{Digest, KeyHasher, Sha256Hasher, SharedClock, SystemClock};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::layout::PathResolver;
use crate::CacheResult;

pub mod lookup;
pub mod transaction;

pub use lookup::Entry;
pub use transaction::{Transaction, TxState};

/// Keyed disk cache with transactional publish
#[derive(Debug, Clone)]
pub struct Cache {
    /// Key to path mapping, rooted at the cache directory
    resolver: PathResolver,
    /// Stamps staged objects and ages them for purge
    clock: SharedClock,
    /// Age threshold used by `purge_expired`
    purge_max_age: Duration,
}

impl Cache {
    /// Open the cache at `root`, creating the directory if needed
    pub fn new<P: AsRef<Utf8Path>>(root: P) -> CacheResult<Self> {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    /// Open the cache at `root` with an explicit time source
    pub fn with_clock<P: AsRef<Utf8Path>>(root: P, clock: SharedClock) -> CacheResult<Self> {
        let root = root.as_ref();

        fs::create_dir_all(root)
            .map_err(|e| StowError::io(format!("Failed to create cache directory {}", root), e))?;

        Self::at_existing_root(root, clock)
    }

    /// Open or create cache `name` under the per-user cache directory
    pub fn open_or_create(name: &str) -> CacheResult<Self> {
        let root = default_cache_root(name)?;
        Self::new(root)
    }

    /// Open the cache described by a resolved configuration
    pub fn from_config(config: &StowConfig) -> CacheResult<Self> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the cache described by `config` with an explicit time source
    pub fn from_config_with_clock(config: &StowConfig, clock: SharedClock) -> CacheResult<Self> {
        let root = config.cache_root()?;

        let cache = if config.create_root {
            Self::with_clock(&root, clock)?
        } else {
            Self::at_existing_root(&root, clock)?
        }
        .with_purge_max_age(config.purge_max_age);

        if config.purge_on_open {
            let report = cache.purge_expired()?;
            info!(
                "Purged {} expired entries ({}) on open",
                report.objects_removed,
                report.format_bytes_freed()
            );
        }

        Ok(cache)
    }

    fn at_existing_root(root: &Utf8Path, clock: SharedClock) -> CacheResult<Self> {
        let root = root
            .canonicalize_utf8()
            .map_err(|e| StowError::io_at(format!("Failed to resolve cache directory {}", root), root, e))?;

        if !root.is_dir() {
            return Err(StowError::io(
                format!("Cache root {} is not a directory", root),
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        debug!("Opened cache at {}", root);
        Ok(Self {
            resolver: PathResolver::new(root, Arc::new(Sha256Hasher)),
            clock,
            purge_max_age: stow_config::merge::DEFAULT_PURGE_MAX_AGE,
        })
    }

    /// Replace the key hasher.
    ///
    /// Every process sharing a root must use the same hasher.
    pub fn with_hasher(mut self, hasher: Arc<dyn KeyHasher>) -> Self {
        self.resolver = PathResolver::new(self.resolver.root().to_path_buf(), hasher);
        self
    }

    /// Set the age threshold used by [`Cache::purge_expired`]
    pub fn with_purge_max_age(mut self, max_age: Duration) -> Self {
        self.purge_max_age = max_age;
        self
    }

    /// Get the root path of the cache
    pub fn root(&self) -> &Utf8Path {
        self.resolver.root()
    }

    /// Digest a key maps to
    pub fn digest(&self, key: &str) -> Digest {
        self.resolver.digest(key)
    }

    /// Age threshold used by [`Cache::purge_expired`]
    pub fn purge_max_age(&self) -> Duration {
        self.purge_max_age
    }

    pub(crate) fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub(crate) fn clock(&self) -> &SharedClock {
        &self.clock
    }
}

/// Remove a file, symlink or directory tree without following symlinks.
///
/// A missing path is not an error.
pub(crate) fn remove_all(path: &Utf8Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Best-effort removal of a superseded or orphaned object; purge reclaims failures
pub(crate) fn discard(path: &Utf8Path) {
    if let Err(e) = remove_all(path) {
        warn!("Failed to remove stale cache object {}: {}", path, e);
    }
}

/// Total size of the files under `path`, not following symlinks
pub(crate) fn disk_usage(path: &Utf8Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|metadata| metadata.is_file())
        .map(|metadata| metadata.len())
        .sum()
}

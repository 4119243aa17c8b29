//! Key lookups and removal.
//!
//! Lookups always go through the published pointer, so they only ever see
//! committed generations.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::{self, Read};
use stow_core::error::StowError;
use tracing::debug;

use super::{discard, Cache, Transaction};
use crate::CacheResult;

/// Attempts at opening a pointer whose target was swapped mid-resolution
const MAX_OPEN_ATTEMPTS: usize = 8;

/// Outcome of [`Cache::create_or_read`]
#[derive(Debug)]
pub enum Entry {
    /// The key was already published
    Existing(File),
    /// The key was missing; a new object was staged and must be committed
    /// or rolled back
    Staged { tx: Transaction, file: File },
}

impl Cache {
    /// Open a file or directory in the cache
    pub fn open(&self, key: &str) -> CacheResult<File> {
        let published = self.published_path(key);
        self.open_published(&published, |path| File::open(path))
    }

    /// Read the file published under `key`
    pub fn read_file(&self, key: &str) -> CacheResult<Vec<u8>> {
        let published = self.published_path(key);
        let mut file = self.open_published(&published, |path| File::open(path))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| StowError::io(format!("Failed to read cache entry {}", published), e))?;
        Ok(contents)
    }

    /// Path to a cache entry if it exists
    pub fn path(&self, key: &str) -> CacheResult<Utf8PathBuf> {
        let published = self.published_path(key);
        fs::metadata(&published)
            .map_err(|e| StowError::io_at(format!("Failed to stat cache entry {}", published), published.clone(), e))?;
        Ok(published)
    }

    /// Path to a cache entry, or `None` if the key is not published
    pub fn path_if_exists(&self, key: &str) -> CacheResult<Option<Utf8PathBuf>> {
        match self.path(key) {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check whether `key` is published
    pub fn contains(&self, key: &str) -> bool {
        matches!(self.path_if_exists(key), Ok(Some(_)))
    }

    /// Open `key` if it is published, otherwise stage a new file for it
    pub fn create_or_read(&self, key: &str) -> CacheResult<Entry> {
        match self.open(key) {
            Ok(file) => Ok(Entry::Existing(file)),
            Err(e) if e.is_not_found() => {
                let (tx, file) = self.create(key)?;
                Ok(Entry::Staged { tx, file })
            },
            Err(e) => Err(e),
        }
    }

    /// Remove a cache entry.
    ///
    /// The pointer is unlinked before its target is deleted, so no reader
    /// can resolve the key to a half-deleted object.
    pub fn remove(&self, key: &str) -> CacheResult<()> {
        let resolver = self.resolver();
        let published = self.published_path(key);

        let target = resolver
            .read_pointer(&published)?
            .ok_or_else(|| StowError::NotFound { path: published.clone() })?;

        fs::remove_file(&published)
            .map_err(|e| StowError::io_at(format!("Failed to remove cache entry {}", published), published.clone(), e))?;
        debug!("Removed {}", published);

        discard(&target);
        Ok(())
    }

    pub(crate) fn published_path(&self, key: &str) -> Utf8PathBuf {
        let resolver = self.resolver();
        resolver.published_path(&resolver.digest(key))
    }

    /// Open through the pointer, retrying when the target it resolved to was
    /// superseded and deleted between resolution and open
    fn open_published<T>(&self, published: &Utf8Path, open: impl Fn(&Utf8Path) -> io::Result<T>) -> CacheResult<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match open(published) {
                Ok(opened) => return Ok(opened),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    let pointer_exists = fs::symlink_metadata(published).is_ok();
                    if !pointer_exists || attempt >= MAX_OPEN_ATTEMPTS {
                        return Err(StowError::NotFound { path: published.to_path_buf() });
                    }
                },
                Err(e) => return Err(StowError::io(format!("Failed to open cache entry {}", published), e)),
            }
        }
    }
}

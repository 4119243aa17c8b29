//! Staging and the transactional publish protocol.
//!
//! A key's content is first written to a staged object whose name carries
//! its creation time. [`Cache::commit`] then makes it visible by creating a
//! fresh symlink that references it and renaming that symlink onto the
//! key's canonical name. The rename replaces any previous pointer in one
//! step, so a reader resolving the key sees either the previous complete
//! generation or the new one. The previous generation stays addressable
//! until the rename has happened and is deleted afterwards.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::symlink;
use stow_core::error::StowError;
use stow_core::Digest;
use tracing::debug;

use super::{discard, remove_all, Cache};
use crate::layout::{staged_name, temp_pointer_name, EntryName};
use crate::CacheResult;

/// Attempts at finding an unused timestamped name before giving up
const MAX_NAME_ATTEMPTS: usize = 16;

/// Naming function for a new entry of a digest
type NameFn = fn(&Digest, DateTime<Utc>) -> CacheResult<String>;

/// Lifecycle of a [`Transaction`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TxState {
    /// Staged, waiting for commit or rollback
    #[default]
    Pending,
    /// Published under its key
    Committed,
    /// Discarded
    RolledBack,
}

/// Token for an uncommitted cache object.
///
/// The token is the staged object's file name. It is resolved exactly once,
/// by [`Cache::commit`] or [`Cache::rollback`]; afterwards both reject it
/// (except that rolling back twice is a no-op). The empty token returned by
/// `Transaction::default()` is never valid.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transaction {
    name: String,
    state: TxState,
}

impl Transaction {
    fn pending(name: String) -> Self {
        Self {
            name,
            state: TxState::Pending,
        }
    }

    /// Rebuild a token from a staged object name, e.g. one handed over by
    /// another process
    pub fn from_name(name: &str) -> CacheResult<Self> {
        match EntryName::parse(name) {
            Ok(EntryName::Staged { .. }) => Ok(Self::pending(name.to_string())),
            _ => Err(StowError::invalid_transaction(name, "not a staged object name")),
        }
    }

    /// The staged object's file name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Whether commit or rollback would accept this token
    pub fn is_pending(&self) -> bool {
        !self.name.is_empty() && self.state == TxState::Pending
    }

    fn digest(&self) -> CacheResult<Digest> {
        match EntryName::parse(&self.name) {
            Ok(EntryName::Staged { digest, .. }) => Ok(digest),
            _ => Err(StowError::invalid_transaction(&self.name, "not a staged object name")),
        }
    }

    fn check_pending(&self) -> CacheResult<()> {
        if self.name.is_empty() {
            return Err(StowError::invalid_transaction("", "empty transaction token"));
        }
        match self.state {
            TxState::Pending => Ok(()),
            TxState::Committed => Err(StowError::invalid_transaction(&self.name, "already committed")),
            TxState::RolledBack => Err(StowError::invalid_transaction(&self.name, "already rolled back")),
        }
    }
}

impl Cache {
    /// Create a file in the cache.
    ///
    /// The file is invisible to lookups until [`Cache::commit`] publishes
    /// it. Every returned transaction must be committed or rolled back.
    ///
    /// ```no_run
    /// # use std::io::Write;
    /// # fn demo(cache: &stow_cache::Cache) -> stow_cache::CacheResult<()> {
    /// let (mut tx, mut file) = cache.create("my-key")?;
    /// file.write_all(b"hello").map_err(|e| stow_core::StowError::io("write", e))?;
    /// drop(file);
    /// cache.commit(&mut tx)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create(&self, key: &str) -> CacheResult<(Transaction, File)> {
        let digest = self.resolver().digest(key);
        let (name, file) = self.allocate(&digest, "file", staged_name, |path| {
            OpenOptions::new().read(true).write(true).create_new(true).open(path)
        })?;
        Ok((Transaction::pending(name), file))
    }

    /// Create a directory in the cache.
    ///
    /// Like [`Cache::create`], the directory becomes visible under `key`
    /// only once committed.
    pub fn mkdir(&self, key: &str) -> CacheResult<(Transaction, Utf8PathBuf)> {
        let digest = self.resolver().digest(key);
        let (name, path) = self.allocate(&digest, "directory", staged_name, |path| {
            fs::create_dir(path).map(|()| path.to_path_buf())
        })?;
        Ok((Transaction::pending(name), path))
    }

    /// Allocate a fresh timestamped entry for `digest` with `make`.
    ///
    /// On a name collision the stamp moves forward by at least one
    /// nanosecond, so allocation succeeds even if the clock stands still.
    fn allocate<T>(
        &self,
        digest: &Digest,
        kind: &str,
        name_for: NameFn,
        make: impl Fn(&Utf8Path) -> io::Result<T>,
    ) -> CacheResult<(String, T)> {
        self.resolver().ensure_partition(digest)?;

        let mut at = self.clock().now();
        let mut last_err = None;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = name_for(digest, at)?;
            let path = self.resolver().entry_path(digest, &name)?;
            match make(&path) {
                Ok(made) => {
                    debug!("Staged cache {} {}", kind, path);
                    return Ok((name, made));
                },
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    last_err = Some(e);
                    let bumped = at + chrono::Duration::nanoseconds(1);
                    at = self.clock().now().max(bumped);
                },
                Err(e) => return Err(StowError::io(format!("Could not create cache {} {}", kind, path), e)),
            }
        }

        Err(StowError::io(
            format!("Could not find a free name for cache {} {}", kind, digest),
            last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::AlreadyExists, "name collision")),
        ))
    }

    /// Atomically publish a staged object under its key.
    ///
    /// Any previously published generation is deleted after the switch;
    /// failure to delete it is logged and left to purge. Returns the
    /// published path.
    pub fn commit(&self, tx: &mut Transaction) -> CacheResult<Utf8PathBuf> {
        tx.check_pending()?;
        let digest = tx.digest()?;
        let resolver = self.resolver();

        let staged = resolver.entry_path(&digest, &tx.name)?;
        fs::symlink_metadata(&staged)
            .map_err(|e| StowError::io_at(format!("Failed to stat staged object {}", staged), staged.clone(), e))?;

        let published = resolver.published_path(&digest);
        let old_target = resolver.read_pointer(&published)?;
        if old_target.as_deref() == Some(staged.as_path()) {
            tx.state = TxState::Committed;
            return Err(StowError::invalid_transaction(&tx.name, "already committed"));
        }

        // Fresh pointer next to the staged object, then swap it into place.
        let (_, temp_pointer) = self.allocate(&digest, "pointer", temp_pointer_name, |path| {
            symlink(&tx.name, path).map(|()| path.to_path_buf())
        })?;
        if let Err(e) = fs::rename(&temp_pointer, &published) {
            discard(&temp_pointer);
            return Err(StowError::io(format!("Failed to publish {}", published), e));
        }
        tx.state = TxState::Committed;
        debug!("Committed {} -> {}", published, tx.name);

        if let Some(old_target) = old_target {
            discard(&old_target);
        }

        Ok(published)
    }

    /// Discard a staged object.
    ///
    /// Rolling back an already rolled back transaction is a no-op.
    pub fn rollback(&self, tx: &mut Transaction) -> CacheResult<()> {
        if tx.state == TxState::RolledBack {
            return Ok(());
        }
        tx.check_pending()?;
        let digest = tx.digest()?;
        let resolver = self.resolver();

        let staged = resolver.entry_path(&digest, &tx.name)?;
        let published = resolver.published_path(&digest);
        if resolver.read_pointer(&published)?.as_deref() == Some(staged.as_path()) {
            // Rebuilt token of an object another handle already published.
            tx.state = TxState::Committed;
            return Err(StowError::invalid_transaction(&tx.name, "already committed"));
        }

        remove_all(&staged)
            .map_err(|e| StowError::io(format!("Failed to roll back staged object {}", staged), e))?;
        tx.state = TxState::RolledBack;
        debug!("Rolled back {}", staged);
        Ok(())
    }

    /// Roll back `tx` if `result` is an error.
    ///
    /// A failing rollback is chained onto the original error. On success the
    /// transaction is left pending.
    pub fn rollback_on_error<T>(&self, tx: &mut Transaction, result: CacheResult<T>) -> CacheResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => match self.rollback(tx) {
                Ok(()) => Err(err),
                Err(rollback_err) => Err(err.with_rollback(rollback_err)),
            },
        }
    }

    /// Commit `tx` if `result` is a success, roll it back otherwise.
    ///
    /// Resolves the transaction on every path: a failed commit is followed
    /// by a rollback, chained the same way as [`Cache::rollback_on_error`].
    pub fn rollback_or_commit<T>(
        &self,
        tx: &mut Transaction,
        result: CacheResult<T>,
    ) -> CacheResult<(T, Utf8PathBuf)> {
        let value = self.rollback_on_error(tx, result)?;
        let committed = self.commit(tx);
        match committed {
            Ok(path) => Ok((value, path)),
            Err(err) if tx.is_pending() => self.rollback_on_error(tx, Err(err)),
            Err(err) => Err(err),
        }
    }

    /// Stage a file, fill it with `write`, and publish it if `write` succeeds
    pub fn stage_file<T, F>(&self, key: &str, write: F) -> CacheResult<(T, Utf8PathBuf)>
    where
        F: FnOnce(&mut File) -> CacheResult<T>,
    {
        let (mut tx, mut file) = self.create(key)?;
        let result = write(&mut file).and_then(|value| {
            file.sync_all()
                .map_err(|e| StowError::io(format!("Failed to flush staged file {}", tx.name), e))?;
            Ok(value)
        });
        drop(file);
        self.rollback_or_commit(&mut tx, result)
    }

    /// Stage a directory, fill it with `populate`, and publish it if
    /// `populate` succeeds
    pub fn stage_dir<T, F>(&self, key: &str, populate: F) -> CacheResult<(T, Utf8PathBuf)>
    where
        F: FnOnce(&Utf8Path) -> CacheResult<T>,
    {
        let (mut tx, dir) = self.mkdir(key)?;
        let result = populate(&dir);
        self.rollback_or_commit(&mut tx, result)
    }

    /// Write `contents` under `key`, replacing any previous value
    pub fn write_file(&self, key: &str, contents: &[u8]) -> CacheResult<Utf8PathBuf> {
        let ((), path) = self.stage_file(key, |file| {
            file.write_all(contents)
                .map_err(|e| StowError::io("Failed to write staged file", e))
        })?;
        Ok(path)
    }
}

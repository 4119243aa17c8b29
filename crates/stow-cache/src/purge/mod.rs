//! Age-based eviction.
//!
//! Purge ages entries by the creation time embedded in their staged names,
//! not by last access. Committed and abandoned objects are treated alike:
//! superseded generations, losers of concurrent commits and staged objects
//! left behind by crashes are all reclaimed once they are old enough.
//! Temporary pointers belong to commits that may still be running; they are
//! only reclaimed once older than [`TEMP_POINTER_GRACE`], whatever the
//! requested age.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::time::Duration;
use stow_core::error::StowError;
use stow_core::Digest;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::layout::{is_partition_name, EntryName};
use crate::store::{disk_usage, remove_all, Cache};
use crate::CacheResult;

/// Minimum age before purge deletes a temporary pointer
pub const TEMP_POINTER_GRACE: Duration = Duration::from_secs(10 * 60);

/// Result of a purge
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    /// Staged objects deleted
    pub objects_removed: usize,
    /// Published pointers unlinked because their target was deleted
    pub pointers_removed: usize,
    /// Temporary pointers left behind by interrupted commits
    pub temp_pointers_removed: usize,
    /// Bytes of file content freed
    pub bytes_freed: u64,
}

impl PurgeReport {
    /// Format freed space in human-readable format
    pub fn format_bytes_freed(&self) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = self.bytes_freed as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", self.bytes_freed, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }
}

/// An entry old enough to evict
#[derive(Debug)]
enum Expired {
    Staged { digest: Digest, path: Utf8PathBuf },
    TempPointer { path: Utf8PathBuf },
}

impl Cache {
    /// Purge all entries older than `max_age`.
    ///
    /// Every entry name is validated before anything is deleted: one
    /// malformed name aborts the purge with `MalformedEntry` and leaves the
    /// cache untouched.
    pub fn purge(&self, max_age: Duration) -> CacheResult<PurgeReport> {
        let expired = self.scan_expired(max_age)?;

        let mut report = PurgeReport::default();
        for entry in &expired {
            match entry {
                Expired::Staged { digest, path } => self.evict(digest, path, &mut report)?,
                Expired::TempPointer { path } => self.evict_temp_pointer(path, &mut report)?,
            }
        }

        info!(
            "Purged {} cache objects older than {:?} ({} freed)",
            report.objects_removed,
            max_age,
            report.format_bytes_freed()
        );
        Ok(report)
    }

    /// Purge with the cache's configured default age
    pub fn purge_expired(&self) -> CacheResult<PurgeReport> {
        self.purge(self.purge_max_age())
    }

    /// Purge `key`'s published generation if it is older than `max_age`.
    ///
    /// A key with no published entry is left alone.
    pub fn purge_key(&self, key: &str, max_age: Duration) -> CacheResult<PurgeReport> {
        let resolver = self.resolver();
        let digest = resolver.digest(key);
        let published = resolver.published_path(&digest);

        let mut report = PurgeReport::default();
        let Some(target) = resolver.read_pointer(&published)? else {
            return Ok(report);
        };

        let created_at = match target.file_name().map(EntryName::parse) {
            Some(Ok(EntryName::Staged { digest: d, created_at })) if d == digest => created_at,
            _ => {
                return Err(StowError::MalformedEntry {
                    path: target,
                    reason: format!("pointer {} does not reference a staged object of its key", published),
                })
            },
        };

        if self.is_expired(created_at, max_age) {
            self.evict(&digest, &target, &mut report)?;
        }
        Ok(report)
    }

    fn is_expired(&self, created_at: DateTime<Utc>, max_age: Duration) -> bool {
        self.clock().since(created_at) >= max_age
    }

    /// Walk every partition and collect the expired staged objects
    fn scan_expired(&self, max_age: Duration) -> CacheResult<Vec<Expired>> {
        let root = self.root();
        let mut expired = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                StowError::io(
                    format!("Failed to scan cache directory {}", path),
                    e.into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory loop")),
                )
            })?;

            let path = Utf8Path::from_path(entry.path()).ok_or_else(|| StowError::MalformedEntry {
                path: Utf8PathBuf::from(entry.path().to_string_lossy().as_ref()),
                reason: "name is not valid UTF-8".to_string(),
            })?;
            let name = path.file_name().unwrap_or_default();

            if entry.depth() == 1 {
                if !entry.file_type().is_dir() {
                    // Files next to the partitions belong to the host.
                    continue;
                }
                if !is_partition_name(name) {
                    return Err(StowError::MalformedEntry {
                        path: path.to_path_buf(),
                        reason: "not a cache partition".to_string(),
                    });
                }
                continue;
            }

            let (digest, created_at, temp) = match EntryName::parse(name) {
                Ok(EntryName::Pointer(_)) => continue,
                Ok(EntryName::Staged { digest, created_at }) => (digest, created_at, false),
                Ok(EntryName::TempPointer { digest, created_at }) => (digest, created_at, true),
                Err(_) => {
                    return Err(StowError::MalformedEntry {
                        path: path.to_path_buf(),
                        reason: "expected <digest>, <digest>.<hex timestamp> or <digest>.<hex timestamp>.tmp"
                            .to_string(),
                    })
                },
            };

            let partition = path.parent().and_then(Utf8Path::file_name).unwrap_or_default();
            if digest.partition() != partition {
                return Err(StowError::MalformedEntry {
                    path: path.to_path_buf(),
                    reason: format!("entry does not belong in partition {}", partition),
                });
            }

            let path = path.to_path_buf();
            if temp {
                if self.is_expired(created_at, max_age.max(TEMP_POINTER_GRACE)) {
                    expired.push(Expired::TempPointer { path });
                }
            } else if self.is_expired(created_at, max_age) {
                expired.push(Expired::Staged { digest, path });
            }
        }

        debug!("Purge scan found {} expired objects", expired.len());
        Ok(expired)
    }

    /// Delete a staged object, unlinking the key's pointer first if it
    /// references this object
    fn evict(&self, digest: &Digest, staged: &Utf8Path, report: &mut PurgeReport) -> CacheResult<()> {
        let resolver = self.resolver();
        let published = resolver.published_path(digest);

        // A pointer to a newer generation stays.
        if resolver.read_pointer(&published)?.as_deref() == Some(staged) {
            match fs::remove_file(&published) {
                Ok(()) => report.pointers_removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {},
                Err(e) => {
                    return Err(StowError::io(format!("Failed to remove entry link {}", published), e));
                },
            }
        }

        let size = disk_usage(staged);
        remove_all(staged).map_err(|e| StowError::io(format!("Failed to remove entry {}", staged), e))?;
        report.objects_removed += 1;
        report.bytes_freed += size;
        debug!("Purged {}", staged);
        Ok(())
    }

    /// Delete a pointer an interrupted commit never renamed into place
    fn evict_temp_pointer(&self, path: &Utf8Path, report: &mut PurgeReport) -> CacheResult<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                report.temp_pointers_removed += 1;
                debug!("Purged stale pointer {}", path);
                Ok(())
            },
            // The commit finished and renamed it
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StowError::io(format!("Failed to remove stale pointer {}", path), e)),
        }
    }
}

#[cfg(test)]
mod tests;

//! On-disk naming of cache entries.
//!
//! ```text
//! <root>/<2-hex-prefix>/<64-hex-digest>                        published pointer
//! <root>/<2-hex-prefix>/<64-hex-digest>.<hex-nanosecond-stamp>  staged object
//! <root>/<2-hex-prefix>/<64-hex-digest>.<hex-nanosecond-stamp>.tmp  pointer being committed
//! ```
//!
//! Every cache operation works purely from these names; there is no index.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::io;
use std::sync::Arc;
use stow_core::error::StowError;
use stow_core::utils::hash::{is_lower_hex, DIGEST_HEX_LEN, PARTITION_HEX_LEN};
use stow_core::utils::path::confine;
use stow_core::{Digest, KeyHasher};

use crate::CacheResult;

/// Separator between digest and timestamp in staged names
pub const STAMP_SEPARATOR: char = '.';

/// Suffix of a pointer that has not yet been renamed into place
pub const TEMP_POINTER_SUFFIX: &str = ".tmp";

/// A parsed entry name inside a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryName {
    /// `<digest>`: the published pointer for a key
    Pointer(Digest),
    /// `<digest>.<stamp>`: a staged object
    Staged {
        digest: Digest,
        created_at: DateTime<Utc>,
    },
    /// `<digest>.<stamp>.tmp`: a pointer created by an in-flight commit
    TempPointer {
        digest: Digest,
        created_at: DateTime<Utc>,
    },
}

impl EntryName {
    /// Parse a file name found inside a partition directory
    pub fn parse(name: &str) -> CacheResult<Self> {
        match name.split_once(STAMP_SEPARATOR) {
            None => Ok(Self::Pointer(Digest::from_hex(name).map_err(|_| malformed(name, "not a digest"))?)),
            Some((digest, rest)) => {
                let digest = Digest::from_hex(digest).map_err(|_| malformed(name, "not a digest"))?;
                let (stamp, temp) = match rest.strip_suffix(TEMP_POINTER_SUFFIX) {
                    Some(stamp) => (stamp, true),
                    None => (rest, false),
                };
                let created_at = decode_stamp(stamp).ok_or_else(|| malformed(name, "invalid timestamp suffix"))?;
                if temp {
                    Ok(Self::TempPointer { digest, created_at })
                } else {
                    Ok(Self::Staged { digest, created_at })
                }
            },
        }
    }

    /// Digest of the key this entry belongs to
    pub fn digest(&self) -> &Digest {
        match self {
            Self::Pointer(digest) | Self::Staged { digest, .. } | Self::TempPointer { digest, .. } => digest,
        }
    }
}

/// Render a creation time as the lowercase hex nanosecond suffix
pub fn encode_stamp(at: DateTime<Utc>) -> CacheResult<String> {
    let nanos = at
        .timestamp_nanos_opt()
        .filter(|n| *n >= 0)
        .ok_or_else(|| {
            StowError::io(
                format!("Clock reading {} cannot be encoded in an entry name", at),
                io::Error::new(io::ErrorKind::InvalidData, "timestamp out of range"),
            )
        })?;
    Ok(format!("{:x}", nanos))
}

/// Parse a hex nanosecond suffix
pub fn decode_stamp(stamp: &str) -> Option<DateTime<Utc>> {
    if !is_lower_hex(stamp) {
        return None;
    }
    let nanos = i64::from_str_radix(stamp, 16).ok()?;
    Some(Utc.timestamp_nanos(nanos))
}

/// Name of a staged object for `digest` created at `at`
pub fn staged_name(digest: &Digest, at: DateTime<Utc>) -> CacheResult<String> {
    Ok(format!("{}{}{}", digest.to_hex(), STAMP_SEPARATOR, encode_stamp(at)?))
}

/// Name of the temporary pointer for `digest` created at `at`
pub fn temp_pointer_name(digest: &Digest, at: DateTime<Utc>) -> CacheResult<String> {
    Ok(format!("{}{}", staged_name(digest, at)?, TEMP_POINTER_SUFFIX))
}

/// Check that a directory name is a partition prefix
pub fn is_partition_name(name: &str) -> bool {
    name.len() == PARTITION_HEX_LEN && is_lower_hex(name)
}

fn malformed(name: &str, reason: &str) -> StowError {
    StowError::MalformedEntry {
        path: name.into(),
        reason: format!("{} (expected {} hex digest, optionally followed by .<hex timestamp>[.tmp])", reason, DIGEST_HEX_LEN),
    }
}

/// Maps keys and entry names to paths under the cache root
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: Utf8PathBuf,
    hasher: Arc<dyn KeyHasher>,
}

impl PathResolver {
    pub fn new(root: Utf8PathBuf, hasher: Arc<dyn KeyHasher>) -> Self {
        Self { root, hasher }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Digest of a logical key
    pub fn digest(&self, key: &str) -> Digest {
        self.hasher.digest(key)
    }

    /// `root/<prefix>`
    pub fn partition_dir(&self, digest: &Digest) -> Utf8PathBuf {
        self.root.join(digest.partition())
    }

    /// `root/<prefix>/<digest>`
    pub fn published_path(&self, digest: &Digest) -> Utf8PathBuf {
        self.partition_dir(digest).join(digest.to_hex())
    }

    /// Path of a named entry, checked to stay under the root
    pub fn entry_path(&self, digest: &Digest, name: &str) -> CacheResult<Utf8PathBuf> {
        confine(&self.root, &self.partition_dir(digest).join(name))
    }

    /// Create the partition directory for `digest`; existing is fine
    pub fn ensure_partition(&self, digest: &Digest) -> CacheResult<Utf8PathBuf> {
        let dir = self.partition_dir(digest);
        match fs::create_dir(&dir) {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(dir),
            Err(e) => Err(StowError::io(format!("Failed to create cache partition {}", dir), e)),
        }
    }

    /// Where a pointer at `pointer` leads, confined to the root.
    ///
    /// Relative link targets are resolved against the partition directory.
    pub fn resolve_pointer_target(&self, pointer: &Utf8Path, target: &std::path::Path) -> CacheResult<Utf8PathBuf> {
        let target = Utf8Path::from_path(target).ok_or_else(|| StowError::MalformedEntry {
            path: pointer.to_path_buf(),
            reason: "pointer target is not valid UTF-8".to_string(),
        })?;
        let resolved = match pointer.parent() {
            Some(dir) if target.is_relative() => dir.join(target),
            _ => target.to_path_buf(),
        };
        confine(&self.root, &resolved)
    }

    /// Read the pointer at `pointer`; `None` if there is none
    pub fn read_pointer(&self, pointer: &Utf8Path) -> CacheResult<Option<Utf8PathBuf>> {
        match fs::read_link(pointer) {
            Ok(target) => self.resolve_pointer_target(pointer, &target).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StowError::io(format!("Failed to read cache pointer {}", pointer), e)),
        }
    }
}

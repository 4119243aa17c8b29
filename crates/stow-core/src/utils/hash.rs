//! Key hashing for on-disk entry names.
//!
//! A logical key is hashed to a fixed-width digest whose lowercase hex form
//! names the entry, and whose first two hex characters name its partition.

use crate::error::{StowError, StowResult};
use sha2::Sha256;
use std::fmt;
use std::fmt::Debug;

/// Length of a digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Length of a digest rendered as hex
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// Length of the partition prefix in hex characters
pub const PARTITION_HEX_LEN: usize = 2;

/// A 256-bit key digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    bytes: [u8; DIGEST_LEN],
}

impl Digest {
    /// Create a new Digest from raw bytes
    pub fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self { bytes }
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.bytes
    }

    /// Convert digest to lowercase hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Name of the partition directory holding this digest's entries
    pub fn partition(&self) -> String {
        hex::encode(&self.bytes[..PARTITION_HEX_LEN / 2])
    }

    /// Parse a digest from its hex form.
    ///
    /// Only the canonical lowercase rendering is accepted, since entry names
    /// on disk are compared byte for byte.
    pub fn from_hex(hex_str: &str) -> StowResult<Self> {
        if hex_str.len() != DIGEST_HEX_LEN || !is_lower_hex(hex_str) {
            return Err(StowError::MalformedEntry {
                path: hex_str.into(),
                reason: format!("expected {} lowercase hex characters", DIGEST_HEX_LEN),
            });
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(hex_str, &mut bytes).map_err(|e| StowError::MalformedEntry {
            path: hex_str.into(),
            reason: format!("invalid hex: {}", e),
        })?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Maps a logical key to its digest
pub trait KeyHasher: Debug + Send + Sync {
    /// Hash `key` to a digest
    fn digest(&self, key: &str) -> Digest;
}

/// SHA-256 key hasher, the hash used by the on-disk layout
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn digest(&self, key: &str) -> Digest {
        use sha2::Digest as _;
        let hash = Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&hash);
        Digest::new(bytes)
    }
}

/// Check that a string is non-empty lowercase hex
pub fn is_lower_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Digests are deterministic, fixed-width and partitioned by prefix
        #[test]
        fn digest_layout_property(key in ".*") {
            let first = Sha256Hasher.digest(&key);
            let second = Sha256Hasher.digest(&key);
            prop_assert_eq!(first, second);

            let hex = first.to_hex();
            let partition = first.partition();
            prop_assert_eq!(hex.len(), DIGEST_HEX_LEN);
            prop_assert!(is_lower_hex(&hex));
            prop_assert_eq!(&hex[..PARTITION_HEX_LEN], partition.as_str());
        }
    }
}

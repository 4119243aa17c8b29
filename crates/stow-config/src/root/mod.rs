//! Default cache root location

use camino::Utf8PathBuf;
use stow_core::error::StowError;
use crate::toml::validate_cache_name;
use crate::ConfigResult;

/// Root for cache `name` under the per-user cache directory
pub fn default_cache_root(name: &str) -> ConfigResult<Utf8PathBuf> {
    validate_cache_name(name)?;

    let cache_dir = dirs::cache_dir().ok_or_else(|| StowError::ConfigValidation {
        field: "cache_dir".to_string(),
        reason: "Could not determine the user cache directory".to_string(),
    })?;

    let cache_dir = Utf8PathBuf::try_from(cache_dir).map_err(|e| StowError::ConfigValidation {
        field: "cache_dir".to_string(),
        reason: format!("Invalid cache directory path: {}", e),
    })?;

    Ok(cache_dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_root_ends_with_name() {
        // Some CI sandboxes have no cache dir; only check when one exists.
        if dirs::cache_dir().is_some() {
            let root = default_cache_root("stow-test").unwrap();
            assert_eq!(root.file_name(), Some("stow-test"));
        }
    }

    #[test]
    fn test_default_root_rejects_bad_name() {
        assert!(default_cache_root("../escape").is_err());
        assert!(default_cache_root("").is_err());
    }
}

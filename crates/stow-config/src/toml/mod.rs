//! stow.toml configuration parsing and serialization

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use stow_core::error::StowError;
use stow_core::utils::path::is_single_component;
use crate::ConfigResult;

/// Complete stow.toml configuration.
///
/// Every field is optional so that a file only needs to name what it
/// overrides; [`crate::ConfigLayering`] fills in the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StowToml {
    /// Cache location
    #[serde(default)]
    pub cache: CacheSection,

    /// Eviction settings
    #[serde(default)]
    pub purge: PurgeSection,

    /// Logging settings
    #[serde(default)]
    pub log: LogSection,
}

/// `[cache]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSection {
    /// Namespace under the per-user cache directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit root directory; takes precedence over `name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<Utf8PathBuf>,

    /// Create the root if it does not exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_root: Option<bool>,
}

/// `[purge]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurgeSection {
    /// Entries older than this many seconds are evicted by a default purge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,

    /// Purge expired entries when the cache is opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_open: Option<bool>,
}

/// `[log]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    /// tracing-subscriber filter directive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl StowToml {
    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn overlay(mut self, other: StowToml) -> StowToml {
        if other.cache.name.is_some() {
            self.cache.name = other.cache.name;
        }
        if other.cache.root.is_some() {
            self.cache.root = other.cache.root;
        }
        if other.cache.create_root.is_some() {
            self.cache.create_root = other.cache.create_root;
        }
        if other.purge.max_age_secs.is_some() {
            self.purge.max_age_secs = other.purge.max_age_secs;
        }
        if other.purge.on_open.is_some() {
            self.purge.on_open = other.purge.on_open;
        }
        if other.log.filter.is_some() {
            self.log.filter = other.log.filter;
        }
        self
    }
}

/// Parse TOML string to StowToml configuration
pub fn parse_stow_toml(content: &str) -> ConfigResult<StowToml> {
    // Syntax first, for precise error locations
    content
        .parse::<toml_edit::DocumentMut>()
        .map_err(|e| located_error(content, e.message(), e.span()))?;

    // Then parse with serde for type safety
    let config: StowToml =
        ::toml::from_str(content).map_err(|e| located_error(content, e.message(), e.span()))?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize StowToml to TOML string
pub fn serialize_stow_toml(config: &StowToml) -> ConfigResult<String> {
    ::toml::to_string_pretty(config).map_err(|e| StowError::TomlParse {
        message: format!("TOML serialization error: {}", e),
        line: 0,
        column: 0,
    })
}

/// Validate the fields a file sets
pub fn validate_config(config: &StowToml) -> ConfigResult<()> {
    if let Some(name) = &config.cache.name {
        validate_cache_name(name)?;
    }

    if let Some(root) = &config.cache.root {
        if root.as_str().is_empty() {
            return Err(StowError::ConfigValidation {
                field: "cache.root".to_string(),
                reason: "root must not be empty".to_string(),
            });
        }
    }

    if config.purge.max_age_secs == Some(0) {
        return Err(StowError::ConfigValidation {
            field: "purge.max_age_secs".to_string(),
            reason: "max age must be greater than zero".to_string(),
        });
    }

    Ok(())
}

/// Check that a cache name is usable as a single directory name
pub fn validate_cache_name(name: &str) -> ConfigResult<()> {
    if !is_single_component(name) {
        return Err(StowError::ConfigValidation {
            field: "cache.name".to_string(),
            reason: format!(
                "Invalid cache name '{}'. Names must be a single directory name without separators",
                name
            ),
        });
    }
    Ok(())
}

/// Load and parse stow.toml from file path
pub fn load_from_file(path: &Utf8Path) -> ConfigResult<StowToml> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StowError::io(format!("Failed to read {}", path), e))?;

    parse_stow_toml(&content).map_err(|e| match e {
        StowError::TomlParse { message, line, column } => StowError::TomlParse {
            message: format!("In file {}: {}", path, message),
            line,
            column,
        },
        StowError::ConfigValidation { field, reason } => StowError::ConfigValidation {
            field,
            reason: format!("In file {}: {}", path, reason),
        },
        other => other,
    })
}

fn located_error(content: &str, message: &str, span: Option<Range<usize>>) -> StowError {
    let (line, column) = span
        .map(|span| line_column(content, span.start))
        .unwrap_or((0, 0));
    StowError::TomlParse {
        message: message.trim().to_string(),
        line,
        column,
    }
}

/// 1-based line and column of a byte offset
fn line_column(content: &str, offset: usize) -> (usize, usize) {
    let before = &content[..offset.min(content.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0) + 1;
    (line, column)
}

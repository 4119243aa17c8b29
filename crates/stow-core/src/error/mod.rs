//! Error types and result aliases for stow operations.
//!
//! Provides a unified error type that covers every failure the cache can
//! report. All failures are returned as values; none is fatal to the process.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Unified error type for all stow operations
#[derive(Error, Debug)]
pub enum StowError {
    // Lookup errors
    #[error("Cache entry not found: {path}")]
    NotFound { path: Utf8PathBuf },

    // Transaction errors
    #[error("Invalid transaction '{token}': {reason}")]
    InvalidTransaction { token: String, reason: String },

    #[error("Path {path} resolves outside of cache root {root}")]
    PathEscape { path: Utf8PathBuf, root: Utf8PathBuf },

    // Purge errors
    #[error("Invalid cache entry {path}: {reason}")]
    MalformedEntry { path: Utf8PathBuf, reason: String },

    // Config errors
    #[error("Failed to parse stow.toml: {message} at line {line}, column {column}")]
    TomlParse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Caller errors carried through transaction combinators
    #[error("Staging failed: {message}")]
    Staging {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{source} (rollback also failed: {rollback})")]
    RollbackFailed {
        #[source]
        source: Box<StowError>,
        rollback: Box<StowError>,
    },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for stow operations
pub type StowResult<T> = Result<T, StowError>;

impl StowError {
    /// Create an IO error from std::io::Error
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create an IO error for `path`, reporting a missing file as `NotFound`
    pub fn io_at(message: impl Into<String>, path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path: path.into() }
        } else {
            Self::io(message, source)
        }
    }

    /// Create an invalid transaction error
    pub fn invalid_transaction(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTransaction {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a caller error raised while producing staged content
    pub fn staging<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Staging {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Attach the error of a failed rollback to the error that triggered it
    pub fn with_rollback(self, rollback: StowError) -> Self {
        Self::RollbackFailed {
            source: Box::new(self),
            rollback: Box::new(rollback),
        }
    }

    /// Check if this error means the entry does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::RollbackFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Io { .. } | Self::Staging { .. })
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidTransaction { .. } => {
                Some("Each transaction must be committed or rolled back exactly once")
            },
            Self::PathEscape { .. } => Some("This is a bug in stow; please report it"),
            Self::MalformedEntry { .. } => {
                Some("Remove the offending entry from the cache directory and purge again")
            },
            Self::ConfigValidation { .. } | Self::TomlParse { .. } => {
                Some("Check stow.toml and STOW_* environment variables")
            },
            Self::Io { .. } => {
                Some("Check that the cache root is writable and lives on a single filesystem")
            },
            _ => None,
        }
    }
}

//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events. Hosts that have no subscriber
//! of their own, and tests, can install a plain fmt subscriber here.

use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor a configured filter is set
pub const DEFAULT_FILTER: &str = "stow_cache=info,stow_config=info,stow_core=info";

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `filter`; `None` falls back to
/// [`DEFAULT_FILTER`]. Returns `false` if a global subscriber was already set.
pub fn setup_logging(filter: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Install a subscriber that writes through the test harness capture
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_noop() {
        setup_test_logging();
        assert!(!setup_logging(Some("stow_cache=debug")));
    }
}

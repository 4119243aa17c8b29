//! Wall-clock indirection.
//!
//! The cache stamps every staged object with `Clock::now` and ages entries
//! with `Clock::since`. Each cache instance owns its clock, so tests can
//! drive time deterministically without touching other instances.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Time source used by the cache
pub trait Clock: Debug + Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Time elapsed since `earlier`; zero if `earlier` lies in the future
    fn since(&self, earlier: DateTime<Utc>) -> Duration;
}

/// Clock shared between a cache and its owner
pub type SharedClock = Arc<dyn Clock>;

/// The real wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn since(&self, earlier: DateTime<Utc>) -> Duration {
        (Utc::now() - earlier).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Deterministic clock for tests.
///
/// Every call to `now` advances the clock by `step` before reading it, so
/// consecutive readings are distinct. `since` reads without advancing.
#[derive(Debug)]
pub struct FakeClock {
    current: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl FakeClock {
    /// Create a clock starting at `start` that ticks `step` per reading
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            current: Mutex::new(start),
            step,
        }
    }

    /// Clock starting at the Unix epoch, ticking one second per reading
    pub fn from_epoch() -> Self {
        Self::new(DateTime::<Utc>::from(std::time::UNIX_EPOCH), Duration::from_secs(1))
    }

    /// Move the clock forward without taking a reading
    pub fn advance(&self, by: Duration) {
        let mut current = self.lock();
        *current = add(*current, by);
    }

    /// Current reading without advancing
    pub fn peek(&self) -> DateTime<Utc> {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        // A poisoned fake clock still holds a valid timestamp.
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::from_epoch()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let mut current = self.lock();
        *current = add(*current, self.step);
        *current
    }

    fn since(&self, earlier: DateTime<Utc>) -> Duration {
        (*self.lock() - earlier).to_std().unwrap_or(Duration::ZERO)
    }
}

fn add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|by| at.checked_add_signed(by))
        .unwrap_or(at)
}

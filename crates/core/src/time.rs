//! Time abstraction for testability
//!
//! Provides a trait-based approach to time operations that allows for
//! deterministic testing without relying on actual time passage. Expiry
//! timestamps are persisted, so the clock deals in wall-clock time
//! (`DateTime<Utc>`) rather than monotonic instants.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use kisanmandi_core::time::{Clock, MockClock, SystemClock};
//!
//! // Use system clock in production
//! let clock = SystemClock;
//! let now = clock.now();
//!
//! // Use mock clock in tests
//! let mock = MockClock::new();
//! let start = mock.now();
//! mock.advance(Duration::from_secs(5));
//! assert_eq!(mock.now() - start, chrono::TimeDelta::seconds(5));
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// Trait for time operations to enable testing
///
/// This trait provides an abstraction over wall-clock time, allowing code
/// to work with either real system time or mocked time for testing.
pub trait Clock: Send + Sync {
    /// Get the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock implementation
///
/// Use this in production code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing
///
/// Allows tests to control time explicitly: the clock starts at a fixed
/// point and only moves when advanced, so TTL expiry can be exercised
/// without real waiting. Clones share the same underlying time.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a new mock clock starting at the current real time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a mock clock pinned to a specific start time.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Advance the mock clock by a duration.
    ///
    /// This simulates time passing without actually waiting.
    pub fn advance(&self, duration: Duration) {
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Pin the mock clock to an absolute time.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock() = time;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

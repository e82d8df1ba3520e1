//! Time sources for the queue store.
//!
//! The store never reads the system time directly; it asks a [`Clock`] so that
//! tests can simulate elapsed visibility timeouts and TTLs deterministically.

use crate::message::Timestamp;
use chrono::Duration;
use std::sync::{Arc, RwLock};

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock for tests and simulations
///
/// Clones share the same underlying instant, so a test can keep one handle and
/// hand another to the store.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<Timestamp>>,
}

impl ManualClock {
    /// Create clock frozen at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = current.plus(by);
    }

    /// Jump the clock to `to`
    pub fn set(&self, to: Timestamp) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Timestamp::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

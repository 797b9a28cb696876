//! Mock clock for testing.

use crate::environment::Clock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// Settable clock.
///
/// Clones share the same instant, so a test can hand one clone to the
/// components and move time forward through another.
#[derive(Debug, Clone)]
pub struct MockClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a clock frozen at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock by `delta` (may be negative).
    pub fn advance(&self, delta: Duration) {
        if let Ok(mut time) = self.time.lock() {
            *time += delta;
        }
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        if let Ok(mut current) = self.time.lock() {
            *current = time;
        }
    }
}

impl Default for MockClock {
    /// 2025-01-01 00:00:00 UTC.
    fn default() -> Self {
        Self::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.time.lock().map_or_else(|_| Utc::now(), |time| *time)
    }
}

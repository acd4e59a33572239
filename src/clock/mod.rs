use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of wall-clock time for session classification.
pub trait Clock: Send + Sync {
    /// Return the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle
/// and hand another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<parking_lot::Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(parking_lot::Mutex::new(now)),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let Ok(delta) = chrono::Duration::from_std(by) else {
            return;
        };
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

//! Wall-clock source.
//!
//! Alarms are scheduled against absolute instants, so the scheduler reads
//! the wall clock rather than tokio's monotonic clock. Tests swap in a
//! [`ManualClock`] to move time without sleeping.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// The operating system's clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.0.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(datetime!(2026-01-01 07:00 UTC));
        let other = clock.clone();

        clock.advance(Duration::from_secs(90));

        assert_eq!(other.now(), datetime!(2026-01-01 07:01:30 UTC));
    }

    #[test]
    fn manual_clock_can_jump_backwards() {
        let clock = ManualClock::new(datetime!(2026-01-01 07:00 UTC));
        clock.set(datetime!(2025-12-31 23:00 UTC));
        assert_eq!(clock.now(), datetime!(2025-12-31 23:00 UTC));
    }
}

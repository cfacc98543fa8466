//! Finds due alarms and hands them to the ring controller.
//!
//! Each alarm moves one way, from pending to fired, by having its
//! `triggered` flag set. The flag is persisted before the controller
//! hears about the alarm, so a crash mid-ring never makes it fire twice.
//!
//! The scheduler is driven by a periodic poll rather than one timer per
//! alarm. Any alarm whose instant has passed is due at the next poll,
//! which covers missed ticks, clock jumps, and alarms that came due while
//! the daemon was not running.

use std::time::Duration;

use time::OffsetDateTime;

use crate::alarm::AlarmId;
use crate::ring::RingController;
use crate::store::AlarmStore;
use crate::tracing::prelude::*;

/// What one poll did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Alarms that started a ringing session.
    pub fired: Vec<AlarmId>,

    /// Alarms that came due while another was ringing. They stay
    /// triggered; this occurrence is lost.
    pub dropped: Vec<AlarmId>,
}

pub struct Scheduler {
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Fire every enabled, armed alarm whose time is at or before `now`,
    /// in stored order.
    pub fn poll(
        &self,
        store: &mut AlarmStore,
        ring: &mut RingController,
        now: OffsetDateTime,
    ) -> PollOutcome {
        let due: Vec<AlarmId> = store
            .records()
            .iter()
            .filter(|r| r.is_due(now))
            .map(|r| r.id.clone())
            .collect();

        let mut outcome = PollOutcome::default();
        for id in due {
            let Some(record) = store.mark_triggered(&id) else {
                continue;
            };
            if let Err(e) = store.save() {
                error!(alarm = %id, error = %e, "Could not save triggered alarm");
            }

            let late = now - record.time;
            if late > self.poll_interval {
                warn!(
                    alarm = %id,
                    late_secs = late.whole_seconds(),
                    "Alarm is firing late"
                );
            }

            if ring.trigger(&record) {
                outcome.fired.push(id);
            } else {
                info!(alarm = %id, "Another alarm is ringing, dropping this one");
                outcome.dropped.push(id);
            }
        }

        outcome
    }
}

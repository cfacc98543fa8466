//! A one-shot latch that opens after a condition holds for a run of
//! consecutive ticks.
//!
//! Counts whole sampling ticks rather than wall time, so a late or
//! skipped tick never counts as noise that was not heard.
//!
//! # State Machine
//!
//! ```text
//!          observe(true)          run >= required
//!  Quiet ──────────────► Building ─────────────────► Opened
//!   ▲                       │                          │
//!   │    observe(false)     │                          │ observe(_)
//!   └───────────────────────┘                          ▼
//!                                                    (stays open)
//! ```
//!
//! - **Quiet:** Last tick was below threshold (or nothing observed yet).
//! - **Building:** Consecutive loud ticks so far, short of the target.
//! - **Opened:** Target reached. Latched; later ticks change nothing.
//!
//! A single quiet tick while building drops the run back to zero.

/// Result of [`SustainedNoise::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseStatus {
    /// Tick was quiet; the run is zero.
    Quiet,

    /// Tick was loud; the run is growing but short of the target.
    Building,

    /// The run just reached the target. Returned exactly once.
    Opened,

    /// Already opened by an earlier tick.
    Open,
}

#[derive(Debug)]
pub struct SustainedNoise {
    required: u32,
    run: u32,
    opened: bool,
}

impl SustainedNoise {
    /// A latch that opens after `required` consecutive loud ticks. At
    /// least one loud tick is always needed.
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            run: 0,
            opened: false,
        }
    }

    /// Feed one tick's verdict.
    ///
    /// | State | loud | Result |
    /// |-------|------|--------|
    /// | not opened | false | `Quiet` (run reset) |
    /// | not opened | true, run < required | `Building` |
    /// | not opened | true, run reaches required | `Opened` |
    /// | opened | any | `Open` |
    pub fn observe(&mut self, loud: bool) -> NoiseStatus {
        if self.opened {
            return NoiseStatus::Open;
        }

        if loud {
            self.run = self.run.saturating_add(1);
        } else {
            self.run = 0;
        }

        if self.run >= self.required {
            self.opened = true;
            NoiseStatus::Opened
        } else if self.run > 0 {
            NoiseStatus::Building
        } else {
            NoiseStatus::Quiet
        }
    }

    /// Consecutive loud ticks in the current run.
    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Completion of the current run, 0.0 to 1.0.
    pub fn fraction(&self) -> f32 {
        (self.run as f32 / self.required as f32).min(1.0)
    }
}

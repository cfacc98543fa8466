//! The noise gate: listens to the microphone and reports when ambient
//! noise has been sustained long enough to unlock the silence action.
//!
//! Each ringing session starts one gate task. The task owns the capture
//! stream for its whole life, so the microphone is released whenever the
//! task ends: when the gate opens, when it is stopped, when the device
//! cannot be opened, or when its handle is dropped.
//!
//! ```text
//!  RingController            gate task                 CaptureDevice
//!       │ start(session)        │                            │
//!       │──────────────────────►│ open()                     │
//!       │                       │───────────────────────────►│
//!       │                       │◄─── stream | PermissionError
//!       │◄─ Unavailable(err) ───│ (on error, task ends)      │
//!       │                       │                            │
//!       │◄─ Progress ───────────│ every sample_interval      │
//!       │◄─ Progress ───────────│                            │
//!       │◄─ Opened ─────────────│ close() ──────────────────►│
//! ```
//!
//! Events carry the session number so the controller can discard any
//! that arrive after their session has ended.

mod sustained;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::audio::{CaptureDevice, CaptureStream, PermissionError};
use crate::config::NoiseGateConfig;
use crate::tracing::prelude::*;

pub use sustained::{NoiseStatus, SustainedNoise};

/// Identifies one ringing session's gate.
pub type SessionId = u64;

/// Where the gate stands after a sample.
#[derive(Debug, Clone, PartialEq)]
pub struct GateProgress {
    /// Loudness of the sample just taken.
    pub loudness: f32,

    /// Consecutive loud samples so far.
    pub sustained_ticks: u32,

    /// Noise still needed before the gate opens.
    pub remaining: Duration,

    /// Completion, 0.0 to 1.0.
    pub fraction: f32,
}

impl GateProgress {
    /// Progress before any sample has been taken.
    pub fn initial(config: &NoiseGateConfig) -> Self {
        Self {
            loudness: 0.0,
            sustained_ticks: 0,
            remaining: config.required,
            fraction: 0.0,
        }
    }

    /// Remaining time in whole seconds, rounded up.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining.as_secs() + u64::from(self.remaining.subsec_nanos() > 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateEventKind {
    /// A sample was taken.
    Progress(GateProgress),

    /// Sustained noise reached the required duration. Sent once, after
    /// which the task ends.
    Opened,

    /// The capture device could not be opened. The gate stays closed.
    Unavailable(PermissionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateEvent {
    pub session: SessionId,
    pub kind: GateEventKind,
}

/// Starts gate tasks against one capture device.
#[derive(Clone)]
pub struct NoiseGate {
    capture: Arc<dyn CaptureDevice>,
    config: NoiseGateConfig,
    events: mpsc::Sender<GateEvent>,
}

impl NoiseGate {
    pub fn new(
        capture: Arc<dyn CaptureDevice>,
        config: NoiseGateConfig,
        events: mpsc::Sender<GateEvent>,
    ) -> Self {
        Self {
            capture,
            config,
            events,
        }
    }

    pub fn config(&self) -> &NoiseGateConfig {
        &self.config
    }

    /// Spawn a gate task for `session`.
    ///
    /// Returns at once; whether the device could be opened is reported
    /// through the event channel, since the request may wait on the user.
    pub fn start(&self, session: SessionId) -> NoiseGateHandle {
        let cancel = CancellationToken::new();
        let task = GateTask {
            session,
            config: self.config.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let capture = self.capture.clone();
        let join = tokio::spawn(async move { task.run(capture).await });

        NoiseGateHandle {
            session,
            cancel,
            task: Some(join),
        }
    }
}

/// Owner's handle on a running gate task.
///
/// Dropping the handle cancels the task; [`stop`](Self::stop) also waits
/// for it to finish, so once it returns the device has been released.
pub struct NoiseGateHandle {
    session: SessionId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl NoiseGateHandle {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Stop sampling and wait until the capture device is released.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(session = self.session, "Noise gate task panicked");
                }
            }
        }
    }
}

impl Drop for NoiseGateHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct GateTask {
    session: SessionId,
    config: NoiseGateConfig,
    events: mpsc::Sender<GateEvent>,
    cancel: CancellationToken,
}

impl GateTask {
    async fn run(self, capture: Arc<dyn CaptureDevice>) {
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(session = self.session, "Noise gate stopped while waiting for microphone");
                return;
            }
            result = capture.open() => result,
        };

        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session = self.session, error = %e, "Noise gate has no microphone");
                self.emit(GateEventKind::Unavailable(e)).await;
                return;
            }
        };

        debug!(session = self.session, "Microphone open, sampling noise");
        self.sample(stream.as_mut()).await;
        stream.close().await;
        debug!(session = self.session, "Noise gate finished, microphone released");
    }

    /// Sample until the gate opens or the task is cancelled.
    async fn sample(&self, stream: &mut dyn CaptureStream) {
        let mut latch = SustainedNoise::new(self.config.required_ticks());
        let period = self.config.sample_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let loudness = stream.loudness();
            let status = latch.observe(loudness > self.config.loudness_threshold);
            let sustained = period.saturating_mul(latch.run());

            trace!(
                session = self.session,
                loudness,
                run = latch.run(),
                required = latch.required(),
                "Noise sample"
            );

            let progress = GateProgress {
                loudness,
                sustained_ticks: latch.run(),
                remaining: self.config.required.saturating_sub(sustained),
                fraction: latch.fraction(),
            };
            if !self.emit(GateEventKind::Progress(progress)).await {
                return;
            }

            if status == NoiseStatus::Opened {
                info!(session = self.session, "Sustained noise reached, gate open");
                self.emit(GateEventKind::Opened).await;
                return;
            }
        }
    }

    /// Send an event unless cancelled first. Returns false when the task
    /// should end (cancelled, or nobody is listening).
    async fn emit(&self, kind: GateEventKind) -> bool {
        let event = GateEvent {
            session: self.session,
            kind,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ScriptedCapture;

    const LOUD: f32 = 80.0;
    const QUIET: f32 = 5.0;

    fn gate(capture: ScriptedCapture) -> (NoiseGate, mpsc::Receiver<GateEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (
            NoiseGate::new(Arc::new(capture), NoiseGateConfig::default(), tx),
            rx,
        )
    }

    async fn next_kind(rx: &mut mpsc::Receiver<GateEvent>) -> GateEventKind {
        rx.recv().await.expect("gate event").kind
    }

    fn progress(kind: GateEventKind) -> GateProgress {
        match kind {
            GateEventKind::Progress(p) => p,
            other => panic!("expected progress, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_five_loud_seconds() {
        let capture = ScriptedCapture::constant(LOUD);
        let (gate, mut rx) = gate(capture.clone());
        let started = Instant::now();

        let handle = gate.start(7);

        for expected_remaining in [4, 3, 2, 1, 0] {
            let p = progress(next_kind(&mut rx).await);
            assert_eq!(p.remaining_secs(), expected_remaining);
        }
        assert_eq!(next_kind(&mut rx).await, GateEventKind::Opened);
        assert_eq!(started.elapsed(), Duration::from_secs(5));

        handle.stop().await;
        assert!(!capture.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn events_carry_session() {
        let (gate, mut rx) = gate(ScriptedCapture::constant(LOUD));
        let _handle = gate.start(42);

        assert_eq!(rx.recv().await.unwrap().session, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_sample_resets_progress() {
        let script = vec![LOUD, LOUD, LOUD, LOUD, QUIET, LOUD, LOUD, LOUD, LOUD, LOUD];
        let (gate, mut rx) = gate(ScriptedCapture::new(script));
        let _handle = gate.start(1);

        for _ in 0..4 {
            progress(next_kind(&mut rx).await);
        }
        let reset = progress(next_kind(&mut rx).await);
        assert_eq!(reset.sustained_ticks, 0);
        assert_eq!(reset.fraction, 0.0);
        assert_eq!(reset.remaining_secs(), 5);

        for _ in 0..5 {
            progress(next_kind(&mut rx).await);
        }
        assert_eq!(next_kind(&mut rx).await, GateEventKind::Opened);
    }

    #[tokio::test(start_paused = true)]
    async fn releases_microphone_when_gate_opens() {
        let capture = ScriptedCapture::constant(LOUD);
        let (gate, mut rx) = gate(capture.clone());
        let handle = gate.start(1);

        while next_kind(&mut rx).await != GateEventKind::Opened {}

        // The stream is dropped in the same step that sends Opened.
        assert!(!capture.is_open());
        handle.stop().await;
        assert_eq!(capture.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_microphone_mid_session() {
        let capture = ScriptedCapture::constant(QUIET);
        let (gate, mut rx) = gate(capture.clone());
        let handle = gate.start(1);

        progress(next_kind(&mut rx).await);
        assert!(capture.is_open());

        handle.stop().await;
        assert!(!capture.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_releases_microphone() {
        let capture = ScriptedCapture::constant(QUIET);
        let (gate, mut rx) = gate(capture.clone());
        let handle = gate.start(1);
        progress(next_kind(&mut rx).await);

        drop(handle);
        time::sleep(Duration::from_millis(1)).await;

        assert!(!capture.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn refused_device_reports_unavailable_and_never_opens() {
        let (gate, mut rx) = gate(ScriptedCapture::refusing(PermissionError::Denied(
            "blocked".into(),
        )));
        let handle = gate.start(1);

        assert_eq!(
            next_kind(&mut rx).await,
            GateEventKind::Unavailable(PermissionError::Denied("blocked".into()))
        );
        handle.stop().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_room_never_opens() {
        let (gate, mut rx) = gate(ScriptedCapture::constant(QUIET));
        let handle = gate.start(1);

        for _ in 0..30 {
            let p = progress(next_kind(&mut rx).await);
            assert_eq!(p.remaining_secs(), 5);
        }
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_requirement_quiet_room_stays_closed() {
        let (tx, mut rx) = mpsc::channel(64);
        let config = NoiseGateConfig {
            required: Duration::ZERO,
            ..Default::default()
        };
        let gate = NoiseGate::new(Arc::new(ScriptedCapture::constant(0.0)), config, tx);
        let handle = gate.start(1);

        for _ in 0..3 {
            let p = progress(next_kind(&mut rx).await);
            assert_eq!(p.sustained_ticks, 0);
            assert_eq!(p.fraction, 0.0);
        }
        handle.stop().await;
        while let Ok(event) = rx.try_recv() {
            assert_ne!(event.kind, GateEventKind::Opened);
        }
    }

    #[test]
    fn remaining_seconds_round_up() {
        let p = GateProgress {
            loudness: 0.0,
            sustained_ticks: 0,
            remaining: Duration::from_millis(2_500),
            fraction: 0.5,
        };
        assert_eq!(p.remaining_secs(), 3);
    }
}

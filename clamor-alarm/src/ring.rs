//! Ringing session control.
//!
//! The [`RingController`] enforces single-flight (at most one alarm rings
//! at a time) and decides when the silence action is allowed.
//!
//! ```text
//!            trigger()                 gate Opened
//!  Idle ─────────────────► Ringing ───────────────► Ringing
//!   ▲                    (gate closed)             (gate open)
//!   │                          │                        │
//!   │                          │ gate Unavailable       │ silence()
//!   │                          ▼                        │
//!   │                       Ringing                     │
//!   │                 (gate denied, alerted)            │
//!   └───────────────────────────────────────────────────┘
//! ```
//!
//! A denied gate never opens; the session lasts until the service shuts
//! down. Nothing times out while waiting for sustained noise.

use std::path::PathBuf;

use tokio::sync::watch;

use crate::alarm::{AlarmId, AlarmRecord};
use crate::api_client::types::{RingStatus, RingingStatus};
use crate::audio::{PermissionError, Player};
use crate::noise_gate::{
    GateEvent, GateEventKind, GateProgress, NoiseGate, NoiseGateHandle, SessionId,
};
use crate::store::AlarmStore;
use crate::tracing::prelude::*;

/// Why a silence request was refused. The controller's state is
/// unchanged when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SilenceError {
    #[error("No alarm is ringing")]
    NotRinging,

    #[error("Not enough sustained noise yet")]
    GateClosed,
}

#[derive(Debug, Clone, PartialEq)]
enum GateState {
    Closed,
    Open,
    Denied(PermissionError),
}

struct RingingSession {
    alarm_id: AlarmId,
    label: String,
    gate: GateState,
    progress: GateProgress,
    handle: NoiseGateHandle,
}

impl RingingSession {
    fn status(&self) -> RingingStatus {
        let alert = match &self.gate {
            GateState::Denied(e) => Some(format!(
                "Could not access microphone. Please grant permission to silence alarms. Error: {e}"
            )),
            _ => None,
        };

        RingingStatus {
            alarm_id: self.alarm_id.clone(),
            label: self.label.clone(),
            remaining_secs: self.progress.remaining_secs(),
            progress: self.progress.fraction,
            silence_enabled: self.gate == GateState::Open,
            alert,
        }
    }
}

pub struct RingController {
    gate: NoiseGate,
    player: Box<dyn Player>,
    sound_asset: PathBuf,
    session: Option<RingingSession>,
    last_session: SessionId,
    status_tx: watch::Sender<RingStatus>,
}

impl RingController {
    pub fn new(gate: NoiseGate, player: Box<dyn Player>, sound_asset: impl Into<PathBuf>) -> Self {
        let (status_tx, _) = watch::channel(RingStatus::default());
        Self {
            gate,
            player,
            sound_asset: sound_asset.into(),
            session: None,
            last_session: 0,
            status_tx,
        }
    }

    /// Receive every status change.
    pub fn subscribe(&self) -> watch::Receiver<RingStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> RingStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    pub fn ringing_alarm(&self) -> Option<&AlarmId> {
        self.session.as_ref().map(|s| &s.alarm_id)
    }

    /// Start ringing for `record`.
    ///
    /// Returns false, changing nothing, if a session is already active.
    pub fn trigger(&mut self, record: &AlarmRecord) -> bool {
        if let Some(active) = &self.session {
            debug!(
                alarm = %record.id,
                ringing = %active.alarm_id,
                "Already ringing, ignoring trigger"
            );
            return false;
        }

        self.last_session += 1;
        let session = self.last_session;

        info!(alarm = %record.id, label = %record.label, session, "Alarm ringing");

        if let Err(e) = self.player.start_loop(&self.sound_asset) {
            error!(alarm = %record.id, error = %e, "Could not play alarm sound");
        }

        let handle = self.gate.start(session);
        self.session = Some(RingingSession {
            alarm_id: record.id.clone(),
            label: record.label.clone(),
            gate: GateState::Closed,
            progress: GateProgress::initial(self.gate.config()),
            handle,
        });
        self.publish();
        true
    }

    /// Apply an event from the noise gate. Events from a session that has
    /// already ended are dropped.
    pub fn handle_gate_event(&mut self, event: GateEvent) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.handle.session() == event.session)
        else {
            trace!(session = event.session, "Dropping stale gate event");
            return;
        };

        match event.kind {
            GateEventKind::Progress(progress) => {
                if session.gate != GateState::Closed {
                    return;
                }
                session.progress = progress;
            }
            GateEventKind::Opened => {
                info!(alarm = %session.alarm_id, "Silence enabled");
                session.gate = GateState::Open;
                session.progress.remaining = std::time::Duration::ZERO;
                session.progress.fraction = 1.0;
            }
            GateEventKind::Unavailable(e) => {
                error!(
                    alarm = %session.alarm_id,
                    error = %e,
                    "Microphone unavailable, alarm cannot be silenced"
                );
                session.gate = GateState::Denied(e);
            }
        }
        self.publish();
    }

    /// Silence the ringing alarm.
    ///
    /// Only allowed once the gate has opened. Stops the sound, waits for
    /// the microphone to be released, disables the alarm and persists.
    pub async fn silence(&mut self, store: &mut AlarmStore) -> Result<AlarmId, SilenceError> {
        match &self.session {
            None => return Err(SilenceError::NotRinging),
            Some(s) if s.gate != GateState::Open => return Err(SilenceError::GateClosed),
            Some(_) => {}
        }
        let Some(session) = self.session.take() else {
            return Err(SilenceError::NotRinging);
        };

        self.player.stop();
        session.handle.stop().await;

        let id = session.alarm_id;
        if store.disable(&id) {
            if let Err(e) = store.save() {
                error!(alarm = %id, error = %e, "Could not save silenced alarm");
            }
        } else {
            warn!(alarm = %id, "Silenced alarm no longer exists");
        }

        info!(alarm = %id, "Alarm silenced");
        self.publish();
        Ok(id)
    }

    /// Stop any active session without touching alarm records.
    pub async fn shutdown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        debug!(alarm = %session.alarm_id, "Ending ringing session for shutdown");
        self.player.stop();
        session.handle.stop().await;
        self.publish();
    }

    fn publish(&self) {
        let status = RingStatus {
            ringing: self.session.as_ref().map(RingingSession::status),
        };
        self.status_tx.send_replace(status);
    }
}

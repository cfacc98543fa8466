//! The alarm service actor.
//!
//! One task owns the [`AlarmStore`] and the [`RingController`]; everything
//! else talks to it through channels. The loop multiplexes four sources:
//!
//! - the shutdown token,
//! - the scheduler's poll interval (first tick immediate, so alarms that
//!   came due while the daemon was down fire at startup),
//! - noise gate events for the ringing session,
//! - commands from the HTTP API.
//!
//! Every mutation is saved at once and the alarm list republished.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::alarm::AlarmRecord;
use crate::api::commands::AlarmCommand;
use crate::api_client::types::RingStatus;
use crate::audio::{CaptureDevice, Player};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::Error;
use crate::noise_gate::{GateEvent, NoiseGate};
use crate::ring::RingController;
use crate::scheduler::Scheduler;
use crate::store::AlarmStore;
use crate::tracing::prelude::*;

const COMMAND_QUEUE: usize = 16;
const GATE_EVENT_QUEUE: usize = 32;

/// Handles for talking to a running [`AlarmService`].
#[derive(Clone)]
pub struct ServiceChannels {
    pub commands: mpsc::Sender<AlarmCommand>,
    pub alarms: watch::Receiver<Vec<AlarmRecord>>,
    pub ringing: watch::Receiver<RingStatus>,
}

pub struct AlarmService {
    store: AlarmStore,
    ring: RingController,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    gate_rx: mpsc::Receiver<GateEvent>,
    command_rx: mpsc::Receiver<AlarmCommand>,
    alarms_tx: watch::Sender<Vec<AlarmRecord>>,
}

impl AlarmService {
    /// Build the service around an already loaded `store`.
    pub fn new(
        config: &Config,
        store: AlarmStore,
        capture: Arc<dyn CaptureDevice>,
        player: Box<dyn Player>,
        clock: Arc<dyn Clock>,
    ) -> (Self, ServiceChannels) {
        let (gate_tx, gate_rx) = mpsc::channel(GATE_EVENT_QUEUE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (alarms_tx, alarms_rx) = watch::channel(store.records().to_vec());

        let gate = NoiseGate::new(capture, config.noise_gate.clone(), gate_tx);
        let ring = RingController::new(gate, player, config.sound_asset.clone());
        let channels = ServiceChannels {
            commands: command_tx,
            alarms: alarms_rx,
            ringing: ring.subscribe(),
        };

        let service = Self {
            store,
            ring,
            scheduler: Scheduler::new(config.poll_interval),
            clock,
            gate_rx,
            command_rx,
            alarms_tx,
        };
        (service, channels)
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.scheduler.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            alarms = self.store.records().len(),
            poll_secs = self.scheduler.poll_interval().as_secs_f32(),
            "Alarm service started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.poll();
                }
                Some(event) = self.gate_rx.recv() => {
                    self.ring.handle_gate_event(event);
                }
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }
            }
        }

        self.ring.shutdown().await;
        info!("Alarm service stopped");
    }

    fn poll(&mut self) {
        let now = self.clock.now();
        let outcome = self.scheduler.poll(&mut self.store, &mut self.ring, now);
        if !outcome.fired.is_empty() || !outcome.dropped.is_empty() {
            self.publish_alarms();
        }
    }

    async fn handle_command(&mut self, command: AlarmCommand) {
        match command {
            AlarmCommand::Create { draft, reply } => {
                let record = self.store.create(draft, self.clock.now());
                info!(alarm = %record.id, label = %record.label, time = %record.time, "Alarm created");
                self.persist();
                let _ = reply.send(Ok(record));
            }
            AlarmCommand::Edit { id, draft, reply } => {
                let result = self.store.edit(&id, draft).ok_or(Error::AlarmNotFound(id));
                if let Ok(record) = &result {
                    info!(alarm = %record.id, time = %record.time, "Alarm edited");
                    self.persist();
                }
                let _ = reply.send(result);
            }
            AlarmCommand::Delete { id, reply } => {
                let result = match self.store.remove(&id) {
                    Some(_) => {
                        info!(alarm = %id, "Alarm deleted");
                        self.persist();
                        Ok(())
                    }
                    None => Err(Error::AlarmNotFound(id)),
                };
                let _ = reply.send(result);
            }
            AlarmCommand::SetEnabled { id, enabled, reply } => {
                let result = self
                    .store
                    .set_enabled(&id, enabled)
                    .ok_or(Error::AlarmNotFound(id));
                if let Ok(record) = &result {
                    info!(alarm = %record.id, enabled, "Alarm toggled");
                    self.persist();
                }
                let _ = reply.send(result);
            }
            AlarmCommand::Silence { reply } => {
                let result = self.ring.silence(&mut self.store).await;
                if result.is_ok() {
                    self.publish_alarms();
                }
                let _ = reply.send(result.map_err(Error::from));
            }
        }
    }

    /// Save and republish. A failed save is logged; the in-memory change
    /// stands.
    fn persist(&mut self) {
        if let Err(e) = self.store.save() {
            error!(error = %e, "Could not save alarms");
        }
        self.publish_alarms();
    }

    fn publish_alarms(&self) {
        self.alarms_tx.send_replace(self.store.records().to_vec());
    }
}

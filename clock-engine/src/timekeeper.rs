//! The timekeeping task body. Owns the [`PersistentState`]; every other task
//! sees it only through message payloads.
//!
//! One control-loop iteration handles at most one message and emits at most
//! one pulse, so a long face advance never holds up tick processing.

#![allow(async_fn_in_trait)]

use embassy_time::Duration;

use crate::bus::{Bus, Message, Press, Quiescent, TaskId};
use crate::clock::{DriftCorrector, DriftOutcome, LocalClock};
use crate::commissioning::{Advance, Commissioning, CommissioningEvent, CommissioningState};
use crate::config::{CHECKPOINT_INTERVAL_SECONDS, RECEIVE_TIMEOUT_MS};
use crate::face::{FaceAction, FaceSynchronizer, advance_position};
use crate::gps::UtcFix;
use crate::logging::{debug, info, trace, warn};
use crate::state::{PersistentState, PulseConfig};
use crate::status::StatusCounters;
use crate::store::{DurableStore, SharedStore, VolatileMirror};
use crate::timezone::{TimezoneRules, utc_to_local};

/// Drives the stepper of the slave face.
pub trait Actuator {
    /// Energize for `active_ms`, then rest for `pause_ms`. Moves the hands by
    /// one minute.
    async fn pulse(&mut self, active_ms: u16, pause_ms: u16);
}

pub struct Timekeeper<'a> {
    clock: &'a LocalClock,
    state: PersistentState,
    rules: TimezoneRules,
    face: FaceSynchronizer,
    commissioning: Commissioning,
    suspended: bool,
    dirty: bool,
    last_checkpoint_uptime: u32,
}

impl<'a> Timekeeper<'a> {
    pub fn new(clock: &'a LocalClock, state: PersistentState, rules: TimezoneRules) -> Self {
        Self {
            clock,
            state,
            rules,
            face: FaceSynchronizer::new(),
            commissioning: Commissioning::new(),
            suspended: false,
            dirty: false,
            last_checkpoint_uptime: state.total_uptime_seconds,
        }
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn pending_pulses(&self) -> u16 {
        self.face.pending()
    }

    pub fn commissioning(&self) -> CommissioningState {
        self.commissioning.state()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Override the actuator timing. Takes effect with the next pulse and is
    /// persisted with the next save.
    pub fn set_pulse_config(&mut self, config: PulseConfig) {
        info!(
            "Pulse timing {} ms on, {} ms off",
            config.pulse_len_ms, config.pulse_pause_ms
        );
        self.state.pulse_config = config;
        self.dirty = true;
    }

    fn counters(&self, bus: &Bus) -> StatusCounters {
        StatusCounters {
            correction_totals: self.state.correction_totals,
            total_uptime_seconds: self.state.total_uptime_seconds,
            face_position: self.state.face_position,
            commissioning: self.commissioning.state(),
            dropped_messages: bus.dropped_messages(),
        }
    }

    fn publish_status(&self, bus: &Bus) {
        let _ = bus.try_send(TaskId::Display, Message::Status(self.counters(bus)));
    }

    pub async fn handle(&mut self, msg: Message, bus: &Bus) {
        match msg {
            Message::Shutdown => self.suspend(bus).await,
            Message::Resume => {
                info!("Timekeeping resumed");
                self.suspended = false;
            }
            Message::Checkpointed(save_count) => {
                self.state.save_count = save_count;
                self.last_checkpoint_uptime = self.state.total_uptime_seconds;
            }
            _ if self.suspended => trace!("Suspended, dropping {:?}", msg),
            Message::SecondTick(utc) => self.on_second_tick(utc, bus),
            Message::GpsFix(fix) => self.on_gps_fix(&fix),
            Message::StartCommissioning => self.on_commissioning(CommissioningEvent::Start, bus),
            Message::StopCommissioning => self.on_commissioning(CommissioningEvent::Stop, bus),
            // A very long hold is the operator's start/stop command
            Message::ButtonPress(Press::VeryLong) => {
                let command = if self.commissioning.is_active() {
                    CommissioningEvent::Stop
                } else {
                    CommissioningEvent::Start
                };
                self.on_commissioning(command, bus)
            }
            Message::ButtonPress(press) => {
                self.on_commissioning(CommissioningEvent::Press(press), bus)
            }
            Message::SlaveAdvance(unit) => {
                self.on_commissioning(CommissioningEvent::SlaveAdvance(unit), bus)
            }
            other => debug!("Timekeeping ignores {:?}", other),
        }
    }

    fn on_second_tick(&mut self, utc: i64, bus: &Bus) {
        self.state.total_uptime_seconds = self.state.total_uptime_seconds.saturating_add(1);
        self.dirty = true;

        let Some(local) = utc_to_local(utc, &self.rules) else {
            warn!("Cannot convert {} to local time", utc);
            return;
        };
        let _ = bus.try_send(TaskId::Display, Message::LocalTime(local));

        if local.second != 0 {
            return;
        }

        if !self.commissioning.is_active() {
            let face = self.state.face_position;
            match self.face.resync(face, local.face_minutes()) {
                FaceAction::Synced => trace!("Face in sync at {}", face),
                FaceAction::Wait { lead } => info!("Face leads by {} min, waiting", lead),
                FaceAction::Advance { pulses } => {
                    debug!("Face at {}, advancing {} min", face, pulses)
                }
            }
        }
        self.publish_status(bus);
    }

    fn on_gps_fix(&mut self, fix: &UtcFix) {
        let corrector = DriftCorrector::new(self.clock);
        match corrector.on_gps_fix(fix, &mut self.state.correction_totals) {
            DriftOutcome::Ignored => return,
            DriftOutcome::InSync { delta } => trace!("Drift {} s", delta),
            DriftOutcome::Seeded | DriftOutcome::Corrected { .. } => {}
        }
        self.state.last_connected_utc = fix.utc;
        self.dirty = true;
    }

    fn on_commissioning(&mut self, event: CommissioningEvent, bus: &Bus) {
        let before = self.commissioning.state();
        let advance = self.commissioning.handle(event);
        let after = self.commissioning.state();

        let explicit = matches!(event, CommissioningEvent::Start | CommissioningEvent::Stop);
        if explicit || before.is_active() != after.is_active() {
            if self.face.pending() > 0 {
                info!("Cancelling {} pending pulses", self.face.pending());
            }
            self.face.cancel();
        }

        match advance {
            Some(Advance::Master(unit)) => {
                self.state.face_position =
                    advance_position(self.state.face_position, unit.minutes());
                self.dirty = true;
                info!("Face now taken as {}", self.state.face_position);
            }
            Some(Advance::Slave(unit)) => self.face.inject(unit.minutes()),
            None => {}
        }

        if before != after || advance.is_some() {
            self.publish_status(bus);
        }
    }

    async fn suspend(&mut self, bus: &Bus) {
        self.face.cancel();
        self.suspended = true;
        info!("Timekeeping suspended");

        let reply = Quiescent {
            task: TaskId::Timekeep,
            state: Some(self.state),
        };
        if let Err(e) = bus.send(TaskId::Power, Message::Suspended(reply)).await {
            warn!("Could not report suspended: {:?}", e);
        }
    }

    /// Emit one pending pulse. Returns false when there was nothing to do.
    pub async fn step_pulse<A: Actuator>(&mut self, actuator: &mut A) -> bool {
        if self.suspended || self.face.pending() == 0 {
            return false;
        }
        let PulseConfig {
            pulse_len_ms,
            pulse_pause_ms,
        } = self.state.pulse_config;
        actuator.pulse(pulse_len_ms, pulse_pause_ms).await;
        self.face.pulse_done(&mut self.state.face_position);
        self.dirty = true;
        true
    }

    fn checkpoint_due(&self) -> bool {
        self.state
            .total_uptime_seconds
            .saturating_sub(self.last_checkpoint_uptime)
            >= CHECKPOINT_INTERVAL_SECONDS
    }

    /// Periodic checkpoint when due, otherwise refresh the RAM mirror if the
    /// state changed since the last call.
    pub async fn persist<D: DurableStore, V: VolatileMirror>(&mut self, store: &SharedStore<D, V>) {
        if self.suspended {
            return;
        }
        if self.checkpoint_due() {
            let result = store.lock().await.save(&mut self.state).await;
            match result {
                Ok(()) => info!("Checkpoint saved, save count {}", self.state.save_count),
                Err(e) => warn!("Checkpoint failed: {:?}", e),
            }
            // a failed checkpoint is retried at the next interval or shutdown
            self.last_checkpoint_uptime = self.state.total_uptime_seconds;
            self.dirty = false;
        } else if self.dirty {
            store.lock().await.update_mirror(&self.state);
            self.dirty = false;
        }
    }

    /// One control-loop iteration.
    pub async fn run_once<A, D, V>(&mut self, bus: &Bus, actuator: &mut A, store: &SharedStore<D, V>)
    where
        A: Actuator,
        D: DurableStore,
        V: VolatileMirror,
    {
        let timeout = if self.face.pending() > 0 && !self.suspended {
            Duration::from_millis(0)
        } else {
            Duration::from_millis(RECEIVE_TIMEOUT_MS)
        };
        if let Some(msg) = bus.receive(TaskId::Timekeep, timeout).await {
            self.handle(msg, bus).await;
        }
        self.step_pulse(actuator).await;
        self.persist(store).await;
    }
}

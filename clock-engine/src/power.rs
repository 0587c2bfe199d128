//! Power rail supervision.
//!
//! The power-good input is sampled once per supervisor iteration. Loss is
//! declared after [`POWER_LOSS_SAMPLES`] consecutive bad samples, recovery
//! only after [`POWER_RECOVERY_SAMPLES`] consecutive good ones.

use embassy_time::Duration;
use statig::{blocking::IntoStateMachineExt as _, prelude::*};

use crate::bus::{Bus, Message, TaskId};
use crate::config::{POWER_LOSS_SAMPLES, POWER_RECOVERY_SAMPLES, SHUTDOWN_REPLY_TIMEOUT_MS};
use crate::logging::{debug, info, warn};
use crate::store::{DurableStore, SharedStore, VolatileMirror};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerEvent {
    Lost,
    Recovered,
}

#[derive(Clone, Copy, Debug)]
enum Sample {
    Good,
    Bad,
}

#[derive(Debug, Default)]
struct DispatchContext {
    event: Option<PowerEvent>,
}

struct Debounce {
    run: u32,
    powered: bool,
}

#[state_machine(initial = "State::powered()")]
impl Debounce {
    #[state]
    fn powered(&mut self, context: &mut DispatchContext, event: &Sample) -> Outcome<State> {
        match event {
            Sample::Good => {
                self.run = 0;
                Handled
            }
            Sample::Bad => {
                self.run += 1;
                if self.run < POWER_LOSS_SAMPLES {
                    return Handled;
                }
                self.run = 0;
                self.powered = false;
                context.event = Some(PowerEvent::Lost);
                Transition(State::unpowered())
            }
        }
    }

    #[state]
    fn unpowered(&mut self, context: &mut DispatchContext, event: &Sample) -> Outcome<State> {
        match event {
            Sample::Bad => {
                self.run = 0;
                Handled
            }
            Sample::Good => {
                self.run += 1;
                if self.run < POWER_RECOVERY_SAMPLES {
                    return Handled;
                }
                self.run = 0;
                self.powered = true;
                context.event = Some(PowerEvent::Recovered);
                Transition(State::powered())
            }
        }
    }
}

/// Debounced view of the power-good signal. Starts out powered.
pub struct PowerMonitor {
    machine: statig::blocking::StateMachine<Debounce>,
}

impl Default for PowerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerMonitor {
    pub fn new() -> Self {
        Self {
            machine: Debounce {
                run: 0,
                powered: true,
            }
            .state_machine(),
        }
    }

    pub fn is_powered(&self) -> bool {
        self.machine.inner().powered
    }

    pub fn sample(&mut self, power_good: bool) -> Option<PowerEvent> {
        let sample = if power_good { Sample::Good } else { Sample::Bad };
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&sample, &mut context);
        context.event
    }
}

pub struct PowerSupervisor<'a> {
    bus: &'a Bus,
    monitor: PowerMonitor,
}

impl<'a> PowerSupervisor<'a> {
    pub fn new(bus: &'a Bus) -> Self {
        Self {
            bus,
            monitor: PowerMonitor::new(),
        }
    }

    pub fn is_powered(&self) -> bool {
        self.monitor.is_powered()
    }

    /// Feed one sample of the power-good input. A declared loss runs the full
    /// shutdown sequence before returning.
    pub async fn sample<D, V>(&mut self, power_good: bool, store: &SharedStore<D, V>) -> Option<PowerEvent>
    where
        D: DurableStore,
        V: VolatileMirror,
    {
        let event = self.monitor.sample(power_good)?;
        match event {
            PowerEvent::Lost => self.shut_down(store).await,
            PowerEvent::Recovered => self.resume().await,
        }
        Some(event)
    }

    async fn shut_down<D, V>(&mut self, store: &SharedStore<D, V>)
    where
        D: DurableStore,
        V: VolatileMirror,
    {
        warn!("Power lost, suspending state owners");
        for owner in TaskId::STATE_OWNERS {
            if let Err(e) = self.bus.send(owner, Message::Shutdown).await {
                warn!("Shutdown to {:?} not delivered: {:?}", owner, e);
            }
        }

        let mut replied = [false; TaskId::STATE_OWNERS.len()];
        let mut snapshot = None;
        let timeout = Duration::from_millis(SHUTDOWN_REPLY_TIMEOUT_MS);
        while replied.iter().any(|done| !done) {
            match self.bus.receive(TaskId::Power, timeout).await {
                Some(Message::Suspended(quiescent)) => {
                    debug!("{:?} suspended", quiescent.task);
                    if let Some(i) = TaskId::STATE_OWNERS.iter().position(|t| *t == quiescent.task) {
                        replied[i] = true;
                    }
                    if quiescent.state.is_some() {
                        snapshot = quiescent.state;
                    }
                }
                Some(other) => debug!("Ignoring {:?} during shutdown", other),
                None => {
                    warn!("Not all state owners suspended, flushing what we have");
                    break;
                }
            }
        }

        let Some(mut state) = snapshot else {
            warn!("No state snapshot received, nothing to flush");
            return;
        };
        let result = store.lock().await.save(&mut state).await;
        match result {
            Ok(()) => {
                info!("State flushed, save count {}", state.save_count);
                let checkpointed = Message::Checkpointed(state.save_count);
                if let Err(e) = self.bus.send(TaskId::Timekeep, checkpointed).await {
                    warn!("Save count {} not delivered: {:?}", state.save_count, e);
                }
            }
            Err(e) => warn!("Flushing state failed: {:?}", e),
        }
    }

    async fn resume(&mut self) {
        info!("Power recovered, resuming");
        for owner in TaskId::STATE_OWNERS {
            if let Err(e) = self.bus.send(owner, Message::Resume).await {
                warn!("Resume to {:?} not delivered: {:?}", owner, e);
            }
        }
        if let Err(e) = self.bus.send(TaskId::Display, Message::RefreshDisplay).await {
            warn!("Display refresh not delivered: {:?}", e);
        }
    }
}

//! Manual alignment of the hands.
//!
//! While commissioning is active the per-minute resync is bypassed. The
//! operator picks a side and steps it one unit at a time: the master side is
//! the position the engine believes the hands show, the slave side is the
//! physical hands themselves.
//!
//! Only `Start` and `Stop` enter and leave the mode; presses navigate inside it.

use statig::{blocking::IntoStateMachineExt as _, prelude::*};

use crate::bus::Press;
use crate::logging::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvanceUnit {
    Minute,
    Hour,
}

impl AdvanceUnit {
    pub const fn minutes(self) -> u16 {
        match self {
            AdvanceUnit::Minute => 1,
            AdvanceUnit::Hour => 60,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            AdvanceUnit::Minute => AdvanceUnit::Hour,
            AdvanceUnit::Hour => AdvanceUnit::Minute,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommissioningState {
    Normal,
    SelectMaster,
    SelectSlave,
    MasterAdvance(AdvanceUnit),
    SlaveAdvance(AdvanceUnit),
}

impl CommissioningState {
    pub fn is_active(self) -> bool {
        self != CommissioningState::Normal
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommissioningEvent {
    Start,
    Stop,
    Press(Press),
    SlaveAdvance(AdvanceUnit),
}

/// Single step requested by the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Advance {
    /// Redefine what the hands are taken to show, no pulses.
    Master(AdvanceUnit),
    /// Move the physical hands.
    Slave(AdvanceUnit),
}

#[derive(Debug, Default)]
struct DispatchContext {
    advance: Option<Advance>,
}

struct CommissioningMachine {
    mode: CommissioningState,
}

impl CommissioningMachine {
    fn go(&mut self, mode: CommissioningState) -> Outcome<State> {
        info!("Commissioning: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
        Transition(match mode {
            CommissioningState::Normal => State::normal(),
            CommissioningState::SelectMaster => State::select_master(),
            CommissioningState::SelectSlave => State::select_slave(),
            CommissioningState::MasterAdvance(_) => State::master_advance(),
            CommissioningState::SlaveAdvance(_) => State::slave_advance(),
        })
    }

    fn toggle_unit(&mut self) {
        self.mode = match self.mode {
            CommissioningState::MasterAdvance(unit) => CommissioningState::MasterAdvance(unit.toggled()),
            CommissioningState::SlaveAdvance(unit) => CommissioningState::SlaveAdvance(unit.toggled()),
            other => other,
        };
        info!("Commissioning unit now {:?}", self.mode);
    }

    fn unit(&self) -> AdvanceUnit {
        match self.mode {
            CommissioningState::MasterAdvance(unit) | CommissioningState::SlaveAdvance(unit) => unit,
            _ => AdvanceUnit::Minute,
        }
    }
}

#[state_machine(initial = "State::normal()")]
impl CommissioningMachine {
    #[state]
    fn normal(&mut self, event: &CommissioningEvent) -> Outcome<State> {
        match event {
            CommissioningEvent::Start => self.go(CommissioningState::SelectMaster),
            _ => Handled,
        }
    }

    #[superstate]
    fn active(&mut self, context: &mut DispatchContext, event: &CommissioningEvent) -> Outcome<State> {
        match event {
            CommissioningEvent::Stop => self.go(CommissioningState::Normal),
            CommissioningEvent::SlaveAdvance(unit) => {
                context.advance = Some(Advance::Slave(*unit));
                Handled
            }
            CommissioningEvent::Start | CommissioningEvent::Press(_) => Handled,
        }
    }

    #[state(superstate = "active")]
    fn select_master(&mut self, event: &CommissioningEvent) -> Outcome<State> {
        match event {
            CommissioningEvent::Press(Press::Short) => self.go(CommissioningState::SelectSlave),
            CommissioningEvent::Press(Press::Long) => {
                self.go(CommissioningState::MasterAdvance(AdvanceUnit::Minute))
            }
            _ => Super,
        }
    }

    #[state(superstate = "active")]
    fn select_slave(&mut self, event: &CommissioningEvent) -> Outcome<State> {
        match event {
            CommissioningEvent::Press(Press::Short) => self.go(CommissioningState::SelectMaster),
            CommissioningEvent::Press(Press::Long) => {
                self.go(CommissioningState::SlaveAdvance(AdvanceUnit::Minute))
            }
            _ => Super,
        }
    }

    #[state(superstate = "active")]
    fn master_advance(&mut self, context: &mut DispatchContext, event: &CommissioningEvent) -> Outcome<State> {
        match event {
            CommissioningEvent::Press(Press::Short) => {
                context.advance = Some(Advance::Master(self.unit()));
                Handled
            }
            CommissioningEvent::Press(Press::Long) => {
                self.toggle_unit();
                Handled
            }
            _ => Super,
        }
    }

    #[state(superstate = "active")]
    fn slave_advance(&mut self, context: &mut DispatchContext, event: &CommissioningEvent) -> Outcome<State> {
        match event {
            CommissioningEvent::Press(Press::Short) => {
                context.advance = Some(Advance::Slave(self.unit()));
                Handled
            }
            CommissioningEvent::Press(Press::Long) => {
                self.toggle_unit();
                Handled
            }
            _ => Super,
        }
    }
}

pub struct Commissioning {
    machine: statig::blocking::StateMachine<CommissioningMachine>,
}

impl Default for Commissioning {
    fn default() -> Self {
        Self::new()
    }
}

impl Commissioning {
    pub fn new() -> Self {
        Self {
            machine: CommissioningMachine {
                mode: CommissioningState::Normal,
            }
            .state_machine(),
        }
    }

    pub fn state(&self) -> CommissioningState {
        self.machine.inner().mode
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Feed one operator event. Returns the step to perform, if any.
    pub fn handle(&mut self, event: CommissioningEvent) -> Option<Advance> {
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&event, &mut context);
        context.advance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(commissioning: &mut Commissioning, press: Press) -> Option<Advance> {
        commissioning.handle(CommissioningEvent::Press(press))
    }

    #[test_log::test]
    fn only_commands_enter_and_leave_commissioning() {
        let mut c = Commissioning::new();
        assert_eq!(c.state(), CommissioningState::Normal);
        for p in [Press::Short, Press::Long, Press::VeryLong] {
            assert_eq!(press(&mut c, p), None);
            assert_eq!(c.state(), CommissioningState::Normal);
        }

        c.handle(CommissioningEvent::Start);
        assert_eq!(c.state(), CommissioningState::SelectMaster);
        assert!(c.is_active());

        // A very long press is no exit from any active state
        press(&mut c, Press::VeryLong);
        assert_eq!(c.state(), CommissioningState::SelectMaster);
        press(&mut c, Press::Long);
        press(&mut c, Press::VeryLong);
        assert_eq!(c.state(), CommissioningState::MasterAdvance(AdvanceUnit::Minute));

        c.handle(CommissioningEvent::Stop);
        assert!(!c.is_active());
    }

    #[test_log::test]
    fn slave_advance_message_is_ignored_outside_commissioning() {
        let mut c = Commissioning::new();
        assert_eq!(c.handle(CommissioningEvent::SlaveAdvance(AdvanceUnit::Hour)), None);
        assert_eq!(c.state(), CommissioningState::Normal);
    }

    #[test_log::test]
    fn short_press_toggles_master_and_slave_selection() {
        let mut c = Commissioning::new();
        c.handle(CommissioningEvent::Start);
        press(&mut c, Press::Short);
        assert_eq!(c.state(), CommissioningState::SelectSlave);
        press(&mut c, Press::Short);
        assert_eq!(c.state(), CommissioningState::SelectMaster);
    }

    #[test_log::test]
    fn master_advance_steps_and_toggles_unit() {
        let mut c = Commissioning::new();
        c.handle(CommissioningEvent::Start);
        press(&mut c, Press::Long);
        assert_eq!(c.state(), CommissioningState::MasterAdvance(AdvanceUnit::Minute));

        assert_eq!(
            press(&mut c, Press::Short),
            Some(Advance::Master(AdvanceUnit::Minute))
        );
        press(&mut c, Press::Long);
        assert_eq!(c.state(), CommissioningState::MasterAdvance(AdvanceUnit::Hour));
        assert_eq!(
            press(&mut c, Press::Short),
            Some(Advance::Master(AdvanceUnit::Hour))
        );

        c.handle(CommissioningEvent::Stop);
        assert_eq!(c.state(), CommissioningState::Normal);
    }

    #[test_log::test]
    fn slave_advance_steps_physical_hands() {
        let mut c = Commissioning::new();
        c.handle(CommissioningEvent::Start);
        press(&mut c, Press::Short);
        press(&mut c, Press::Long);
        assert_eq!(c.state(), CommissioningState::SlaveAdvance(AdvanceUnit::Minute));
        assert_eq!(
            press(&mut c, Press::Short),
            Some(Advance::Slave(AdvanceUnit::Minute))
        );

        c.handle(CommissioningEvent::Stop);
        assert_eq!(c.state(), CommissioningState::Normal);
    }

    #[test_log::test]
    fn slave_advance_message_works_in_any_active_state() {
        let mut c = Commissioning::new();
        c.handle(CommissioningEvent::Start);
        assert_eq!(
            c.handle(CommissioningEvent::SlaveAdvance(AdvanceUnit::Hour)),
            Some(Advance::Slave(AdvanceUnit::Hour))
        );
        press(&mut c, Press::Long);
        assert_eq!(
            c.handle(CommissioningEvent::SlaveAdvance(AdvanceUnit::Minute)),
            Some(Advance::Slave(AdvanceUnit::Minute))
        );
        assert_eq!(c.state(), CommissioningState::MasterAdvance(AdvanceUnit::Minute));
    }

    #[test_log::test]
    fn stop_returns_to_normal_from_anywhere() {
        let mut c = Commissioning::new();
        c.handle(CommissioningEvent::Start);
        press(&mut c, Press::Short);
        press(&mut c, Press::Long);
        press(&mut c, Press::Long);
        assert_eq!(c.state(), CommissioningState::SlaveAdvance(AdvanceUnit::Hour));

        c.handle(CommissioningEvent::Stop);
        assert_eq!(c.state(), CommissioningState::Normal);

        // A second start begins again from master selection
        c.handle(CommissioningEvent::Start);
        assert_eq!(c.state(), CommissioningState::SelectMaster);
        c.handle(CommissioningEvent::Start);
        assert_eq!(c.state(), CommissioningState::SelectMaster);
    }
}

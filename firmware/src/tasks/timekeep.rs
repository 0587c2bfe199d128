use clock_engine::state::PersistentState;
use clock_engine::timekeeper::{Actuator, Timekeeper};
use clock_engine::timezone::TimezoneRules;
use defmt::info;
use embassy_executor::task;
use embassy_rp::gpio::{Level, Output};
use embassy_time::{Duration, Timer};

use crate::config_resources::PulseOutputResources;
use crate::flash_store::ClockStore;
use crate::{BUS, CLOCK};

/// Lavet stepper on a two-pin bridge. Each step needs the opposite polarity
/// of the one before.
struct BridgeStepper<'d> {
    coil_a: Output<'d>,
    coil_b: Output<'d>,
    forward: bool,
}

impl<'d> BridgeStepper<'d> {
    fn new(coil_a: Output<'d>, coil_b: Output<'d>, face_position: u16) -> Self {
        // Even positions were reached with a reverse pulse
        Self {
            coil_a,
            coil_b,
            forward: face_position % 2 == 0,
        }
    }
}

impl Actuator for BridgeStepper<'_> {
    async fn pulse(&mut self, active_ms: u16, pause_ms: u16) {
        let coil = if self.forward {
            &mut self.coil_a
        } else {
            &mut self.coil_b
        };
        coil.set_high();
        Timer::after(Duration::from_millis(active_ms.into())).await;
        coil.set_low();
        self.forward = !self.forward;
        Timer::after(Duration::from_millis(pause_ms.into())).await;
    }
}

#[task]
pub async fn timekeep_task(
    r: PulseOutputResources,
    state: PersistentState,
    rules: TimezoneRules,
    store: &'static ClockStore,
) {
    info!("Starting timekeeping task");

    let mut stepper = BridgeStepper::new(
        Output::new(r.coil_a, Level::Low),
        Output::new(r.coil_b, Level::Low),
        state.face_position,
    );
    let mut timekeeper = Timekeeper::new(&CLOCK, state, rules);

    info!("Timekeeping task initialized, face at {}", state.face_position);

    loop {
        timekeeper.run_once(&BUS, &mut stepper, store).await;
    }
}

//! Whole-engine scenarios on the host: tick source, GPS fixes, timekeeping,
//! power loss and recovery running against one bus.

use std::cell::Cell;

use clock_engine::bus::{Bus, Message, TaskId};
use clock_engine::clock::LocalClock;
use clock_engine::config::{POWER_LOSS_SAMPLES, POWER_RECOVERY_SAMPLES};
use clock_engine::gps::{FixError, GpsAdapter, GpsLink, UtcFix, utc_from_calendar};
use clock_engine::power::{PowerEvent, PowerSupervisor};
use clock_engine::state::{CorrectionTotals, PersistentState, RECORD_LEN, RecordBytes};
use clock_engine::store::{DurableStore, PersistentStore, SharedStore, StoreError, VolatileMirror};
use clock_engine::timekeeper::{Actuator, Timekeeper};
use clock_engine::timezone::TimezoneRules;
use embassy_futures::{block_on, join::join3, yield_now};
use embassy_time::Duration;

struct Stepper<'a> {
    pulses: &'a Cell<u32>,
}

impl Actuator for Stepper<'_> {
    async fn pulse(&mut self, _active_ms: u16, _pause_ms: u16) {
        self.pulses.set(self.pulses.get() + 1);
    }
}

struct Flash<'a> {
    record: &'a Cell<Option<RecordBytes>>,
    writes: &'a Cell<u32>,
}

impl DurableStore for Flash<'_> {
    async fn read(&mut self) -> Result<Option<RecordBytes>, StoreError> {
        Ok(self.record.get())
    }

    async fn write(&mut self, record: &RecordBytes) -> Result<(), StoreError> {
        self.writes.set(self.writes.get() + 1);
        self.record.set(Some(*record));
        Ok(())
    }
}

struct Ram<'a> {
    record: &'a Cell<RecordBytes>,
}

impl VolatileMirror for Ram<'_> {
    fn read(&self) -> RecordBytes {
        self.record.get()
    }

    fn write(&mut self, record: &RecordBytes) {
        self.record.set(*record);
    }
}

/// Never completes a sentence; the scenarios inject fixes directly.
struct SilentReceiver;

impl GpsAdapter for SilentReceiver {
    fn feed(&mut self, _byte: u8) -> bool {
        false
    }

    fn read_fix(&self) -> Result<UtcFix, FixError> {
        Err(FixError::NoFix)
    }
}

fn fix(utc: i64) -> UtcFix {
    UtcFix {
        utc,
        age_ms: 0,
        valid: true,
    }
}

fn drain(bus: &Bus, task: TaskId) {
    while bus.try_receive(task).is_some() {}
}

#[test_log::test]
fn steady_fixes_cause_no_corrections_and_one_step_per_minute() {
    let bus = Bus::new();
    let clock = LocalClock::new();
    let pulses = Cell::new(0);
    let mut stepper = Stepper { pulses: &pulses };

    // 13:08:55 UTC, hands already at 1:08
    let start = utc_from_calendar(2025, 11, 15, 13, 8, 55).unwrap();
    let mut tk = Timekeeper::new(
        &clock,
        PersistentState {
            face_position: 68,
            ..PersistentState::default()
        },
        TimezoneRules::UTC,
    );

    block_on(async {
        tk.handle(Message::GpsFix(fix(start)), &bus).await;
        for second in 1..=130i64 {
            let utc = clock.on_second_tick(&bus).unwrap();
            assert_eq!(utc, start + second);
            // three fixes two seconds apart, agreeing with the tick rate
            if (2..=6).contains(&second) && second % 2 == 0 {
                tk.handle(Message::GpsFix(fix(utc)), &bus).await;
            }
            while let Some(msg) = bus.try_receive(TaskId::Timekeep) {
                tk.handle(msg, &bus).await;
            }
            while tk.step_pulse(&mut stepper).await {}
            drain(&bus, TaskId::Display);
        }
    });

    // 13:08:55 + 130 s = 13:11:05, three minute boundaries crossed
    assert_eq!(tk.state().correction_totals, CorrectionTotals::default());
    assert_eq!(pulses.get(), 3);
    assert_eq!(tk.state().face_position, 71);
    assert_eq!(tk.state().total_uptime_seconds, 130);
    assert_eq!(tk.state().last_connected_utc, start + 6);
}

#[test_log::test]
fn power_loss_flushes_once_and_stops_pulses_until_recovery() {
    let bus = Bus::new();
    let clock = LocalClock::new();
    let pulses = Cell::new(0);
    let flash_record = Cell::new(None);
    let flash_writes = Cell::new(0);
    let ram = Cell::new([0u8; RECORD_LEN]);
    let store = SharedStore::new(PersistentStore::new(
        Flash {
            record: &flash_record,
            writes: &flash_writes,
        },
        Ram { record: &ram },
    ));

    let minute = utc_from_calendar(2025, 11, 15, 23, 8, 0).unwrap();
    let mut tk = Timekeeper::new(&clock, PersistentState::default(), TimezoneRules::UTC);
    let mut gps = GpsLink::new(SilentReceiver);
    let mut supervisor = PowerSupervisor::new(&bus);

    // Face at 0, target 668: a long advance is in progress when power fails
    bus.try_send(TaskId::Timekeep, Message::SecondTick(minute)).unwrap();

    let shutdowns = Cell::new(0u32);
    let done = Cell::new(false);
    let pulses_at_loss = Cell::new(None);

    let power = async {
        for _ in 0..POWER_LOSS_SAMPLES - 1 {
            assert_eq!(supervisor.sample(false, &store).await, None);
            yield_now().await;
        }
        assert_eq!(supervisor.sample(false, &store).await, Some(PowerEvent::Lost));
        pulses_at_loss.set(Some(pulses.get()));

        // Brown-out keeps going for a while, then power comes back slowly
        for _ in 0..500 {
            assert_eq!(supervisor.sample(false, &store).await, None);
            yield_now().await;
        }
        for _ in 0..POWER_RECOVERY_SAMPLES - 1 {
            assert_eq!(supervisor.sample(true, &store).await, None);
            yield_now().await;
        }
        assert_eq!(pulses.get(), pulses_at_loss.get().unwrap());
        assert_eq!(
            supervisor.sample(true, &store).await,
            Some(PowerEvent::Recovered)
        );
        done.set(true);
    };

    let timekeeping = async {
        let mut stepper = Stepper { pulses: &pulses };
        while !done.get() {
            let timeout = Duration::from_millis(if tk.pending_pulses() > 0 { 0 } else { 20 });
            if let Some(msg) = bus.receive(TaskId::Timekeep, timeout).await {
                if msg == Message::Shutdown {
                    shutdowns.set(shutdowns.get() + 1);
                }
                tk.handle(msg, &bus).await;
            }
            tk.step_pulse(&mut stepper).await;
            tk.persist(&store).await;
            yield_now().await;
        }
        // pick up the Resume sent on recovery
        while let Some(msg) = bus.try_receive(TaskId::Timekeep) {
            tk.handle(msg, &bus).await;
        }
    };

    let gps_input = async {
        while !done.get() {
            if let Some(msg) = bus.receive(TaskId::Gps, Duration::from_millis(20)).await {
                if msg == Message::Shutdown {
                    shutdowns.set(shutdowns.get() + 1);
                }
                gps.handle(msg, &bus).await;
            }
        }
        while let Some(msg) = bus.try_receive(TaskId::Gps) {
            gps.handle(msg, &bus).await;
        }
    };

    block_on(join3(power, timekeeping, gps_input));

    assert_eq!(shutdowns.get(), 2);
    assert_eq!(flash_writes.get(), 1);
    assert!(pulses.get() < 668, "advance was interrupted");

    let flushed = PersistentState::from_bytes(&flash_record.get().unwrap()).unwrap();
    assert_eq!(flushed.save_count, 1);
    assert_eq!(flushed.face_position as u32, pulses.get());
    assert_eq!(tk.state().save_count, 1);
    assert!(!tk.is_suspended());
    assert!(!gps.is_suspended());
    let mut display = Vec::new();
    while let Some(msg) = bus.try_receive(TaskId::Display) {
        display.push(msg);
    }
    assert_eq!(display.last(), Some(&Message::RefreshDisplay));

    // The next minute re-plans from where the hands stopped
    let mut stepper = Stepper { pulses: &pulses };
    block_on(async {
        tk.handle(Message::SecondTick(minute + 60), &bus).await;
        while tk.step_pulse(&mut stepper).await {}
    });
    assert_eq!(tk.state().face_position, 669);
}

//! Local second counter and GPS drift correction.
//!
//! The counter is advanced by the 1 Hz tick source and overwritten by the
//! timekeeping task on resync. Both paths go through a critical section: the
//! target cannot update a 64 bit value atomically, and the tick source may
//! run in interrupt context, so a lock is not an option.

use core::cell::Cell;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::bus::{Bus, Message, TaskId};
use crate::config::MAX_DRIFT_SECONDS;
use crate::gps::UtcFix;
use crate::logging::{info, trace};
use crate::state::CorrectionTotals;

#[derive(Clone, Copy)]
struct Counter {
    utc: i64,
    running: bool,
}

pub struct LocalClock {
    counter: Mutex<Cell<Counter>>,
    restarted: Signal<CriticalSectionRawMutex, ()>,
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalClock {
    pub const fn new() -> Self {
        Self {
            counter: Mutex::new(Cell::new(Counter {
                utc: 0,
                running: false,
            })),
            restarted: Signal::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        critical_section::with(|cs| self.counter.borrow(cs).get().running)
    }

    /// Current UTC seconds, `None` until the first fix seeded the counter.
    pub fn now(&self) -> Option<i64> {
        critical_section::with(|cs| {
            let counter = self.counter.borrow(cs).get();
            counter.running.then_some(counter.utc)
        })
    }

    /// Advance the counter by one second. Does nothing while stopped.
    pub fn tick(&self) -> Option<i64> {
        critical_section::with(|cs| {
            let cell = self.counter.borrow(cs);
            let mut counter = cell.get();
            if !counter.running {
                return None;
            }
            counter.utc += 1;
            cell.set(counter);
            Some(counter.utc)
        })
    }

    /// Body of the tick callback: count and notify the timekeeping task
    /// without blocking. A dropped tick heals itself on the next one.
    pub fn on_second_tick(&self, bus: &Bus) -> Option<i64> {
        let utc = self.tick()?;
        trace!("tick {}", utc);
        let _ = bus.try_send(TaskId::Timekeep, Message::SecondTick(utc));
        Some(utc)
    }

    /// Overwrite the counter and mark it running in one critical section, so
    /// the tick source never sees a half-written value. The tick task is then
    /// told to restart its period so the next tick comes a full second later.
    pub fn restart_at(&self, utc: i64) {
        critical_section::with(|cs| {
            self.counter.borrow(cs).set(Counter { utc, running: true });
        });
        self.restarted.signal(());
    }

    /// Resolves when the counter was overwritten since the last call.
    pub async fn wait_restart(&self) {
        self.restarted.wait().await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriftOutcome {
    /// Fix was not valid, nothing changed.
    Ignored,
    /// First fix since boot started the counter.
    Seeded,
    /// Drift within tolerance, left alone.
    InSync { delta: i64 },
    /// Counter overwritten; `delta` is local minus GPS.
    Corrected { delta: i64 },
}

pub struct DriftCorrector<'a> {
    clock: &'a LocalClock,
}

impl<'a> DriftCorrector<'a> {
    pub const fn new(clock: &'a LocalClock) -> Self {
        Self { clock }
    }

    pub fn on_gps_fix(&self, fix: &UtcFix, totals: &mut CorrectionTotals) -> DriftOutcome {
        if !fix.valid {
            return DriftOutcome::Ignored;
        }

        let Some(local) = self.clock.now() else {
            info!("Seeding local clock with {}", fix.utc);
            self.clock.restart_at(fix.utc);
            return DriftOutcome::Seeded;
        };

        let delta = local - fix.utc;
        if delta.abs() <= MAX_DRIFT_SECONDS {
            return DriftOutcome::InSync { delta };
        }

        self.clock.restart_at(fix.utc);
        let magnitude = u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX);
        if delta < 0 {
            totals.total_pos_seconds = totals.total_pos_seconds.saturating_add(magnitude);
        } else {
            totals.total_neg_seconds = totals.total_neg_seconds.saturating_add(magnitude);
        }
        info!(
            "Local clock off by {} s, resynced to {} (corrected +{} / -{})",
            delta, fix.utc, totals.total_pos_seconds, totals.total_neg_seconds
        );
        DriftOutcome::Corrected { delta }
    }
}

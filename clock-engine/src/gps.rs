//! Boundary to the GPS receiver and the rules deciding whether a fix can be
//! trusted.

use time::{Date, Month, PrimitiveDateTime, Time};

use crate::bus::{Bus, LockState, Message, Quiescent, TaskId};
use crate::config::{FIX_AGE_INVALID, GPS_LOST_TIMEOUT_MS, MAX_FIX_AGE_MS};
use crate::logging::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UtcFix {
    /// Seconds since the Unix epoch.
    pub utc: i64,
    /// Milliseconds since the receiver produced the fix.
    pub age_ms: u32,
    pub valid: bool,
}

impl UtcFix {
    pub const fn invalid() -> Self {
        Self {
            utc: 0,
            age_ms: FIX_AGE_INVALID,
            valid: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FixError {
    /// The receiver never reported a fix.
    NoFix,
    /// The fix is too old to resync against.
    Stale,
    /// Calendar values that cannot be right, e.g. before the firmware was built.
    Implausible,
}

/// Turns a byte stream into UTC fixes. The sentence decoding itself lives
/// behind this trait.
pub trait GpsAdapter {
    /// Feed one received byte. Returns true when a complete sentence was decoded.
    fn feed(&mut self, byte: u8) -> bool;

    /// The fix carried by the last decoded sentence.
    fn read_fix(&self) -> Result<UtcFix, FixError>;
}

/// Seconds since the epoch for a calendar date and time, or `None` if the
/// values do not form a valid date.
pub fn utc_from_calendar(
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Option<i64> {
    let month = Month::try_from(month).ok()?;
    let date = Date::from_calendar_date(year, month, day).ok()?;
    let time = Time::from_hms(hour, minute, second).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp())
}

/// First second of the given year, used as the plausibility floor for fixes.
pub fn year_start_utc(year: i32) -> i64 {
    utc_from_calendar(year, 1, 1, 0, 0, 0).unwrap_or(0)
}

pub fn validate_fix(utc: i64, age_ms: u32, earliest_utc: i64) -> Result<UtcFix, FixError> {
    if age_ms == FIX_AGE_INVALID {
        return Err(FixError::NoFix);
    }
    if age_ms > MAX_FIX_AGE_MS {
        return Err(FixError::Stale);
    }
    if utc < earliest_utc {
        return Err(FixError::Implausible);
    }
    Ok(UtcFix {
        utc,
        age_ms,
        valid: true,
    })
}

/// Derives the receiver lock state from the arrival of fixes.
pub struct LockTracker {
    state: LockState,
    last_valid_ms: Option<u64>,
    last_sentence_ms: u64,
}

impl Default for LockTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTracker {
    pub const fn new() -> Self {
        Self {
            state: LockState::Uninitialized,
            last_valid_ms: None,
            last_sentence_ms: 0,
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    fn set(&mut self, state: LockState) -> Option<LockState> {
        if self.state == state {
            None
        } else {
            self.state = state;
            Some(state)
        }
    }

    /// Record a decoded sentence. Returns the new state if it changed.
    pub fn on_fix(&mut self, now_ms: u64, fix: &Result<UtcFix, FixError>) -> Option<LockState> {
        self.last_sentence_ms = now_ms;
        match fix {
            Ok(_) => {
                self.last_valid_ms = Some(now_ms);
                self.set(LockState::Locked)
            }
            // Talking again but never locked
            Err(_) if self.last_valid_ms.is_none() => self.set(LockState::Uninitialized),
            Err(_) => self.poll(now_ms),
        }
    }

    /// Re-evaluate without new data, e.g. when the byte stream went silent.
    /// Before the first valid fix only silence counts as lost.
    pub fn poll(&mut self, now_ms: u64) -> Option<LockState> {
        let since = self.last_valid_ms.unwrap_or(self.last_sentence_ms);
        if now_ms.saturating_sub(since) > GPS_LOST_TIMEOUT_MS {
            self.set(LockState::Lost)
        } else {
            None
        }
    }
}

/// The GPS task body: decodes fixes, tracks the lock and forwards both.
pub struct GpsLink<A> {
    adapter: A,
    tracker: LockTracker,
    suspended: bool,
}

impl<A: GpsAdapter> GpsLink<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            tracker: LockTracker::new(),
            suspended: false,
        }
    }

    pub fn lock_state(&self) -> LockState {
        self.tracker.state()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    async fn publish_lock(&self, lock: LockState, bus: &Bus) {
        info!("GPS lock {:?}", lock);
        let _ = bus.send(TaskId::Display, Message::LockState(lock)).await;
    }

    /// Feed one received byte; a completed sentence is validated and a usable
    /// fix is forwarded to timekeeping.
    pub async fn on_byte(&mut self, byte: u8, now_ms: u64, bus: &Bus) {
        if self.suspended || !self.adapter.feed(byte) {
            return;
        }

        let fix = self.adapter.read_fix();
        if let Some(lock) = self.tracker.on_fix(now_ms, &fix) {
            self.publish_lock(lock, bus).await;
        }
        match fix {
            Ok(fix) => {
                if let Err(e) = bus.send(TaskId::Timekeep, Message::GpsFix(fix)).await {
                    warn!("Fix not delivered: {:?}", e);
                }
            }
            Err(e) => debug!("Fix rejected: {:?}", e),
        }
    }

    /// Called when no byte arrived for a while.
    pub async fn poll(&mut self, now_ms: u64, bus: &Bus) {
        if self.suspended {
            return;
        }
        if let Some(lock) = self.tracker.poll(now_ms) {
            self.publish_lock(lock, bus).await;
        }
    }

    pub async fn handle(&mut self, msg: Message, bus: &Bus) {
        match msg {
            Message::Shutdown => {
                self.suspended = true;
                info!("GPS input suspended");
                let reply = Quiescent {
                    task: TaskId::Gps,
                    state: None,
                };
                if let Err(e) = bus.send(TaskId::Power, Message::Suspended(reply)).await {
                    warn!("Could not report suspended: {:?}", e);
                }
            }
            Message::Resume => {
                info!("GPS input resumed");
                self.suspended = false;
            }
            other => debug!("GPS ignores {:?}", other),
        }
    }
}

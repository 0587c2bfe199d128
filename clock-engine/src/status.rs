//! What the display shows. The display task only renders; everything it
//! knows arrives as messages and is folded into a [`StatusBoard`].

use crate::bus::{LockState, Message};
use crate::commissioning::CommissioningState;
use crate::config::STATUS_PAGE_SECONDS;
use crate::state::CorrectionTotals;
use crate::timezone::LocalTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusCounters {
    pub correction_totals: CorrectionTotals,
    pub total_uptime_seconds: u32,
    pub face_position: u16,
    pub commissioning: CommissioningState,
    pub dropped_messages: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusPage {
    Lock,
    CorrectionPos,
    CorrectionNeg,
    Uptime,
    Face,
}

impl StatusPage {
    const ROTATION: [StatusPage; 5] = [
        StatusPage::Lock,
        StatusPage::CorrectionPos,
        StatusPage::CorrectionNeg,
        StatusPage::Uptime,
        StatusPage::Face,
    ];

    /// Page shown during the given second of the minute.
    pub fn at_second(second: u8) -> Self {
        let slot = (second / STATUS_PAGE_SECONDS) as usize;
        Self::ROTATION[slot % Self::ROTATION.len()]
    }
}

/// Uptime in the largest unit that still fits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uptime {
    Seconds(u32),
    Hours(u32),
    Days(u32),
}

impl From<u32> for Uptime {
    fn from(seconds: u32) -> Self {
        const HOUR: u32 = 3600;
        const DAY: u32 = 24 * HOUR;
        if seconds < HOUR {
            Uptime::Seconds(seconds)
        } else if seconds < DAY {
            Uptime::Hours(seconds / HOUR)
        } else {
            Uptime::Days(seconds / DAY)
        }
    }
}

/// Content of the secondary display line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusLine {
    Lock(LockState),
    CorrectionPos(u32),
    CorrectionNeg(u32),
    Uptime(Uptime),
    /// Hands position as hour and minute on the 12 hour face.
    Face { hour: u8, minute: u8 },
    Commissioning(CommissioningState),
    /// Nothing received yet.
    Waiting,
}

pub struct StatusBoard {
    lock: LockState,
    local: Option<LocalTime>,
    counters: Option<StatusCounters>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub const fn new() -> Self {
        Self {
            lock: LockState::Uninitialized,
            local: None,
            counters: None,
        }
    }

    /// Fold a display message into the board. Returns true if the rendered
    /// output may have changed.
    pub fn apply(&mut self, msg: &Message) -> bool {
        match msg {
            Message::LockState(lock) => self.lock = *lock,
            Message::LocalTime(local) => self.local = Some(*local),
            Message::Status(counters) => self.counters = Some(*counters),
            Message::RefreshDisplay => {}
            _ => return false,
        }
        true
    }

    /// Status line for the current second. Commissioning takes over the line
    /// until it ends.
    pub fn line(&self) -> StatusLine {
        let (Some(local), Some(counters)) = (self.local, self.counters) else {
            return StatusLine::Waiting;
        };
        if counters.commissioning.is_active() {
            return StatusLine::Commissioning(counters.commissioning);
        }

        match StatusPage::at_second(local.second) {
            StatusPage::Lock => StatusLine::Lock(self.lock),
            StatusPage::CorrectionPos => {
                StatusLine::CorrectionPos(counters.correction_totals.total_pos_seconds)
            }
            StatusPage::CorrectionNeg => {
                StatusLine::CorrectionNeg(counters.correction_totals.total_neg_seconds)
            }
            StatusPage::Uptime => StatusLine::Uptime(counters.total_uptime_seconds.into()),
            StatusPage::Face => {
                let hour = (counters.face_position / 60) as u8;
                StatusLine::Face {
                    hour: if hour == 0 { 12 } else { hour },
                    minute: (counters.face_position % 60) as u8,
                }
            }
        }
    }
}

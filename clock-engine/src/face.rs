//! Closing the gap between the physical hands and the wall clock.
//!
//! The stepper only moves forward, so a face that is ahead of the target can
//! either wait for the target to catch up or step almost a full turn. Small
//! leads wait, everything else steps.

use crate::config::{FACE_MINUTES, MAX_LOCAL_CLOCK_LEAD_MINUTES};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaceAction {
    Synced,
    /// The face leads by `lead` minutes; hold until the target catches up.
    Wait { lead: u16 },
    Advance { pulses: u16 },
}

/// Add `minutes` to a face position, wrapping at 12 hours.
pub fn advance_position(position: u16, minutes: u16) -> u16 {
    ((position as u32 + minutes as u32) % FACE_MINUTES as u32) as u16
}

/// Decide how to bring `face` to `target`. Both are minutes after 12 in `[0, 720)`.
pub fn reduce_minute_diff(face: u16, target: u16) -> FaceAction {
    let full = FACE_MINUTES as i32;
    let half = full / 2;
    let lead_limit = MAX_LOCAL_CLOCK_LEAD_MINUTES as i32;

    // into (-360, 360]
    let mut diff = (target as i32 - face as i32).rem_euclid(full);
    if diff > half {
        diff -= full;
    }

    match diff {
        0 => FaceAction::Synced,
        d if d > 0 => FaceAction::Advance { pulses: d as u16 },
        d if -d <= lead_limit => FaceAction::Wait { lead: (-d) as u16 },
        // far ahead: stepping past 12 is the only way back
        d => FaceAction::Advance {
            pulses: (full + d) as u16,
        },
    }
}

/// Outstanding pulse count of the face advance in progress.
#[derive(Debug, Default)]
pub struct FaceSynchronizer {
    pending: u16,
}

impl FaceSynchronizer {
    pub const fn new() -> Self {
        Self { pending: 0 }
    }

    pub fn pending(&self) -> u16 {
        self.pending
    }

    /// Re-plan from the current face position. Replaces whatever was pending,
    /// the plan is always relative to where the hands are now.
    pub fn resync(&mut self, face: u16, target: u16) -> FaceAction {
        let action = reduce_minute_diff(face, target);
        self.pending = match action {
            FaceAction::Advance { pulses } => pulses,
            FaceAction::Synced | FaceAction::Wait { .. } => 0,
        };
        action
    }

    /// Queue extra pulses outside the per-minute plan.
    pub fn inject(&mut self, pulses: u16) {
        self.pending = self.pending.saturating_add(pulses);
    }

    pub fn cancel(&mut self) {
        self.pending = 0;
    }

    /// Account for one emitted pulse.
    pub fn pulse_done(&mut self, face: &mut u16) {
        if self.pending == 0 {
            return;
        }
        *face = advance_position(*face, 1);
        self.pending -= 1;
    }
}

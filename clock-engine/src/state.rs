//! The record that survives a power cycle, and its fixed binary layout.
//!
//! Layout, little endian, [`RECORD_LEN`] bytes:
//!
//! | offset | field              | type |
//! | ------ | ------------------ | ---- |
//! | 0      | magic              | u32  |
//! | 4      | last_connected_utc | i64  |
//! | 12     | face_position      | u16  |
//! | 14     | total_pos_seconds  | u32  |
//! | 18     | total_neg_seconds  | u32  |
//! | 22     | total_uptime       | u32  |
//! | 26     | save_count         | u32  |
//! | 30     | pulse_len_ms       | u16  |
//! | 32     | pulse_pause_ms     | u16  |
//! | 34     | crc32 of 0..34     | u32  |

use crc::{CRC_32_ISO_HDLC, Crc};

use crate::config::{DEFAULT_PULSE_LEN_MS, DEFAULT_PULSE_PAUSE_MS, FACE_MINUTES, VALID_MAGIC};

pub const RECORD_LEN: usize = 38;
const CRC_OFFSET: usize = RECORD_LEN - 4;

const RECORD_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub type RecordBytes = [u8; RECORD_LEN];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CorrectionTotals {
    /// Seconds added because the local clock lagged.
    pub total_pos_seconds: u32,
    /// Seconds removed because the local clock led.
    pub total_neg_seconds: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseConfig {
    pub pulse_len_ms: u16,
    pub pulse_pause_ms: u16,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            pulse_len_ms: DEFAULT_PULSE_LEN_MS,
            pulse_pause_ms: DEFAULT_PULSE_PAUSE_MS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PersistentState {
    pub last_connected_utc: i64,
    /// Minutes after 12 the hands currently show, `[0, 720)`.
    pub face_position: u16,
    pub correction_totals: CorrectionTotals,
    pub total_uptime_seconds: u32,
    pub save_count: u32,
    pub magic: u32,
    pub pulse_config: PulseConfig,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            last_connected_utc: 0,
            face_position: 0,
            correction_totals: CorrectionTotals::default(),
            total_uptime_seconds: 0,
            save_count: 0,
            magic: VALID_MAGIC,
            pulse_config: PulseConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    BadMagic,
    BadChecksum,
    OutOfRange,
}

fn read_u16(bytes: &RecordBytes, at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &RecordBytes, at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_i64(bytes: &RecordBytes, at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_le_bytes(raw)
}

impl PersistentState {
    pub fn to_bytes(&self) -> RecordBytes {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..12].copy_from_slice(&self.last_connected_utc.to_le_bytes());
        out[12..14].copy_from_slice(&self.face_position.to_le_bytes());
        out[14..18].copy_from_slice(&self.correction_totals.total_pos_seconds.to_le_bytes());
        out[18..22].copy_from_slice(&self.correction_totals.total_neg_seconds.to_le_bytes());
        out[22..26].copy_from_slice(&self.total_uptime_seconds.to_le_bytes());
        out[26..30].copy_from_slice(&self.save_count.to_le_bytes());
        out[30..32].copy_from_slice(&self.pulse_config.pulse_len_ms.to_le_bytes());
        out[32..34].copy_from_slice(&self.pulse_config.pulse_pause_ms.to_le_bytes());
        let crc = RECORD_CRC.checksum(&out[..CRC_OFFSET]);
        out[CRC_OFFSET..].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode a record. The magic word is checked before anything else is trusted.
    pub fn from_bytes(bytes: &RecordBytes) -> Result<Self, RecordError> {
        if read_u32(bytes, 0) != VALID_MAGIC {
            return Err(RecordError::BadMagic);
        }
        if RECORD_CRC.checksum(&bytes[..CRC_OFFSET]) != read_u32(bytes, CRC_OFFSET) {
            return Err(RecordError::BadChecksum);
        }

        let state = Self {
            magic: VALID_MAGIC,
            last_connected_utc: read_i64(bytes, 4),
            face_position: read_u16(bytes, 12),
            correction_totals: CorrectionTotals {
                total_pos_seconds: read_u32(bytes, 14),
                total_neg_seconds: read_u32(bytes, 18),
            },
            total_uptime_seconds: read_u32(bytes, 22),
            save_count: read_u32(bytes, 26),
            pulse_config: PulseConfig {
                pulse_len_ms: read_u16(bytes, 30),
                pulse_pause_ms: read_u16(bytes, 32),
            },
        };
        if state.face_position >= FACE_MINUTES {
            return Err(RecordError::OutOfRange);
        }
        Ok(state)
    }
}

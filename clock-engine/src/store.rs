//! Loading and flushing [`PersistentState`].
//!
//! Two backings: a volatile mirror that survives soft resets, and a durable
//! store. Loading trusts the first one that yields a valid record and falls
//! back to defaults otherwise. Saving always writes both.

#![allow(async_fn_in_trait)]

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

use crate::config::VALID_MAGIC;
use crate::logging::{debug, info, warn};
use crate::state::{PersistentState, RecordBytes};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Read or write of the durable backing failed.
    Durable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootSource {
    Mirror,
    Durable,
    Defaults,
}

/// Blob store keyed by a fixed namespace/key pair.
pub trait DurableStore {
    /// `Ok(None)` when nothing was ever stored.
    async fn read(&mut self) -> Result<Option<RecordBytes>, StoreError>;
    async fn write(&mut self, record: &RecordBytes) -> Result<(), StoreError>;
}

/// Memory that keeps its contents across a reset but not across a power cycle.
pub trait VolatileMirror {
    fn read(&self) -> RecordBytes;
    fn write(&mut self, record: &RecordBytes);
}

/// The store as shared by the timekeeping task (checkpoints, mirror) and the
/// power supervisor (shutdown flush).
pub type SharedStore<D, V> = Mutex<CriticalSectionRawMutex, PersistentStore<D, V>>;

pub struct PersistentStore<D, V> {
    durable: D,
    mirror: V,
}

impl<D: DurableStore, V: VolatileMirror> PersistentStore<D, V> {
    pub fn new(durable: D, mirror: V) -> Self {
        Self { durable, mirror }
    }

    /// Boot time load. Never fails: any broken source falls through to the
    /// next one, and the defaults are written out as a fresh record.
    pub async fn load(&mut self) -> (PersistentState, BootSource) {
        match PersistentState::from_bytes(&self.mirror.read()) {
            Ok(state) => {
                info!("Loaded state from RAM mirror, saved {} times", state.save_count);
                return (state, BootSource::Mirror);
            }
            Err(e) => debug!("RAM mirror not usable: {:?}", e),
        }

        match self.durable.read().await {
            Ok(Some(bytes)) => match PersistentState::from_bytes(&bytes) {
                Ok(state) => {
                    info!("Loaded state from flash, saved {} times", state.save_count);
                    self.mirror.write(&bytes);
                    return (state, BootSource::Durable);
                }
                Err(e) => warn!("Stored record rejected: {:?}", e),
            },
            Ok(None) => info!("No stored record"),
            Err(e) => warn!("Reading stored record failed: {:?}", e),
        }

        let mut state = PersistentState::default();
        if let Err(e) = self.save(&mut state).await {
            warn!("Writing fresh record failed: {:?}", e);
        }
        info!("Starting from defaults");
        (state, BootSource::Defaults)
    }

    /// Write the complete record to both backings. `save_count` is bumped
    /// before writing, so the stored record carries its own count.
    pub async fn save(&mut self, state: &mut PersistentState) -> Result<(), StoreError> {
        state.magic = VALID_MAGIC;
        state.save_count = state.save_count.wrapping_add(1);
        let bytes = state.to_bytes();
        self.mirror.write(&bytes);
        self.durable.write(&bytes).await
    }

    /// Refresh only the volatile mirror.
    pub fn update_mirror(&mut self, state: &PersistentState) {
        self.mirror.write(&state.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CorrectionTotals, RECORD_LEN};
    use embassy_futures::block_on;

    #[derive(Default)]
    struct FakeFlash {
        record: Option<RecordBytes>,
        fail_reads: bool,
        fail_writes: bool,
        writes: u32,
    }

    impl DurableStore for &mut FakeFlash {
        async fn read(&mut self) -> Result<Option<RecordBytes>, StoreError> {
            if self.fail_reads {
                return Err(StoreError::Durable);
            }
            Ok(self.record)
        }

        async fn write(&mut self, record: &RecordBytes) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::Durable);
            }
            self.writes += 1;
            self.record = Some(*record);
            Ok(())
        }
    }

    struct FakeRam([u8; RECORD_LEN]);

    impl VolatileMirror for &mut FakeRam {
        fn read(&self) -> RecordBytes {
            self.0
        }

        fn write(&mut self, record: &RecordBytes) {
            self.0 = *record;
        }
    }

    fn garbage_ram() -> FakeRam {
        FakeRam([0xa5; RECORD_LEN])
    }

    fn state_with_face(face_position: u16) -> PersistentState {
        PersistentState {
            face_position,
            correction_totals: CorrectionTotals {
                total_pos_seconds: 4,
                total_neg_seconds: 5,
            },
            ..PersistentState::default()
        }
    }

    #[test_log::test]
    fn empty_backings_fall_back_to_defaults_and_write_fresh_record() {
        let mut flash = FakeFlash::default();
        let mut ram = garbage_ram();
        let mut store = PersistentStore::new(&mut flash, &mut ram);

        let (state, source) = block_on(store.load());

        assert_eq!(source, BootSource::Defaults);
        assert_eq!(state.face_position, 0);
        assert_eq!(state.save_count, 1);
        assert_eq!(flash.writes, 1);
        assert_eq!(PersistentState::from_bytes(&ram.0), Ok(state));
    }

    #[test_log::test]
    fn save_twice_bumps_count_by_two() {
        let mut flash = FakeFlash::default();
        let mut ram = garbage_ram();
        let mut store = PersistentStore::new(&mut flash, &mut ram);
        let mut state = state_with_face(42);

        block_on(store.save(&mut state)).unwrap();
        let first = state;
        block_on(store.save(&mut state)).unwrap();

        assert_eq!(state.save_count, first.save_count + 1);
        assert_eq!(
            PersistentState {
                save_count: first.save_count,
                ..state
            },
            first
        );
        assert_eq!(flash.writes, 2);
    }

    #[test_log::test]
    fn load_after_save_returns_saved_record() {
        let mut flash = FakeFlash::default();
        let mut ram = garbage_ram();
        let mut store = PersistentStore::new(&mut flash, &mut ram);
        let mut state = state_with_face(600);

        block_on(store.save(&mut state)).unwrap();
        let (loaded, source) = block_on(store.load());

        assert_eq!(loaded, state);
        assert_eq!(loaded.magic, VALID_MAGIC);
        assert_eq!(source, BootSource::Mirror);
    }

    #[test_log::test]
    fn power_cycle_loads_from_flash() {
        let mut flash = FakeFlash::default();
        let mut state = state_with_face(123);
        {
            let mut ram = garbage_ram();
            let mut store = PersistentStore::new(&mut flash, &mut ram);
            block_on(store.save(&mut state)).unwrap();
        }

        // RAM content does not survive losing power
        let mut ram = garbage_ram();
        let mut store = PersistentStore::new(&mut flash, &mut ram);
        let (loaded, source) = block_on(store.load());

        assert_eq!(source, BootSource::Durable);
        assert_eq!(loaded, state);
        // Mirror is primed for the next soft reset
        assert_eq!(PersistentState::from_bytes(&ram.0), Ok(state));
    }

    #[test_log::test]
    fn corrupt_flash_and_read_errors_fall_back_to_defaults() {
        let mut flash = FakeFlash {
            record: Some([0xff; RECORD_LEN]),
            ..FakeFlash::default()
        };
        let mut ram = garbage_ram();
        let (_, source) = block_on(PersistentStore::new(&mut flash, &mut ram).load());
        assert_eq!(source, BootSource::Defaults);

        let mut flash = FakeFlash {
            fail_reads: true,
            ..FakeFlash::default()
        };
        let mut ram = garbage_ram();
        let (state, source) = block_on(PersistentStore::new(&mut flash, &mut ram).load());
        assert_eq!(source, BootSource::Defaults);
        assert_eq!(state.face_position, 0);
    }

    #[test_log::test]
    fn failed_write_is_reported_but_mirror_kept() {
        let mut flash = FakeFlash {
            fail_writes: true,
            ..FakeFlash::default()
        };
        let mut ram = garbage_ram();
        let mut store = PersistentStore::new(&mut flash, &mut ram);
        let mut state = state_with_face(77);

        assert_eq!(block_on(store.save(&mut state)), Err(StoreError::Durable));
        assert_eq!(PersistentState::from_bytes(&ram.0), Ok(state));
    }

    #[test_log::test]
    fn mirror_update_does_not_touch_flash() {
        let mut flash = FakeFlash::default();
        let mut ram = garbage_ram();
        let mut store = PersistentStore::new(&mut flash, &mut ram);

        store.update_mirror(&state_with_face(9));

        assert_eq!(flash.writes, 0);
        assert_eq!(PersistentState::from_bytes(&ram.0).unwrap().face_position, 9);
    }
}

//! Hardware backings of the persistent state: the flash key/value map and a
//! RAM block left alone by the runtime across resets.

use core::mem::MaybeUninit;

use clock_engine::state::RecordBytes;
use clock_engine::store::{DurableStore, SharedStore, StoreError, VolatileMirror};
use defmt::warn;
use portable_atomic::{AtomicBool, Ordering};

use crate::config::STATE_RECORD_KEY;
use crate::config_manager::CONFIG_MANAGER;

pub type ClockStore = SharedStore<FlashStore, RamMirror>;

/// The state record under a fixed key of the flash map.
pub struct FlashStore;

impl DurableStore for FlashStore {
    async fn read(&mut self) -> Result<Option<RecordBytes>, StoreError> {
        let mut config_manager = CONFIG_MANAGER.get().await.lock().await;
        config_manager
            .get::<RecordBytes>(STATE_RECORD_KEY)
            .await
            .map_err(|e| {
                warn!("Reading state record failed: {:?}", e);
                StoreError::Durable
            })
    }

    async fn write(&mut self, record: &RecordBytes) -> Result<(), StoreError> {
        let mut config_manager = CONFIG_MANAGER.get().await.lock().await;
        config_manager
            .set(STATE_RECORD_KEY, record)
            .await
            .map_err(|e| {
                warn!("Writing state record failed: {:?}", e);
                StoreError::Durable
            })
    }
}

#[unsafe(link_section = ".uninit.STATE_MIRROR")]
static mut STATE_MIRROR: MaybeUninit<RecordBytes> = MaybeUninit::uninit();

static MIRROR_TAKEN: AtomicBool = AtomicBool::new(false);

/// Handle to the `.uninit` copy of the record. After a cold boot it holds
/// garbage, which the record checks reject.
pub struct RamMirror {
    _private: (),
}

impl RamMirror {
    /// The only handle. `None` if it was already taken.
    pub fn take() -> Option<Self> {
        if MIRROR_TAKEN.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self { _private: () })
    }
}

impl VolatileMirror for RamMirror {
    fn read(&self) -> RecordBytes {
        // SAFETY: a single handle exists, and every bit pattern is a valid byte array.
        unsafe { (&raw const STATE_MIRROR).cast::<RecordBytes>().read_volatile() }
    }

    fn write(&mut self, record: &RecordBytes) {
        // SAFETY: as above; `&mut self` excludes concurrent readers.
        unsafe {
            (&raw mut STATE_MIRROR)
                .cast::<RecordBytes>()
                .write_volatile(*record)
        }
    }
}

use clock_engine::timezone::TimezoneRules;
use defmt::{debug, error, info};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::once_lock::OnceLock;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{SerializationError, Value, fetch_item, store_item};

use crate::flash_layout::get_state_range;
use crate::{OM_FLASH, config::*};

#[derive(Debug, defmt::Format)]
pub enum ConfigError {
    // Flash operation errors
    Flash(embassy_rp::flash::Error),
    // Other storage errors
    Storage,
}

impl From<embassy_rp::flash::Error> for ConfigError {
    fn from(error: embassy_rp::flash::Error) -> Self {
        ConfigError::Flash(error)
    }
}

impl From<sequential_storage::Error<embassy_rp::flash::Error>> for ConfigError {
    fn from(error: sequential_storage::Error<embassy_rp::flash::Error>) -> Self {
        match error {
            sequential_storage::Error::Storage { value, .. } => ConfigError::Flash(value),
            _ => ConfigError::Storage,
        }
    }
}

impl From<SerializationError> for ConfigError {
    fn from(_: SerializationError) -> Self {
        ConfigError::Storage
    }
}

/// Key/value access to the state range of the flash. Holds both the clock
/// state record and the runtime settings.
pub struct ConfigManager {
    data_buffer: [u8; FLASH_DATA_BUFFER_SIZE],
}

impl ConfigManager {
    fn new() -> Self {
        Self {
            data_buffer: [0u8; FLASH_DATA_BUFFER_SIZE],
        }
    }

    pub async fn set<T>(&mut self, key: u16, value: &T) -> Result<(), ConfigError>
    where
        T: for<'b> Value<'b>,
    {
        debug!("Storing item with key: {}", key);

        let mut flash = OM_FLASH.get().await.lock().await;

        store_item(
            &mut *flash,
            get_state_range(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &key,
            value,
        )
        .await
        .map_err(ConfigError::from)
    }

    // Retrieve a value or None if the key was never stored
    pub async fn get<T>(&mut self, key: u16) -> Result<Option<T>, ConfigError>
    where
        T: for<'b> Value<'b>,
    {
        debug!("Fetching item with key: {}", key);

        let mut flash = OM_FLASH.get().await.lock().await;

        fetch_item(
            &mut *flash,
            get_state_range(),
            &mut NoCache::new(),
            &mut self.data_buffer,
            &key,
        )
        .await
        .map_err(ConfigError::from)
    }
}

pub static CONFIG_MANAGER: OnceLock<Mutex<CriticalSectionRawMutex, ConfigManager>> =
    OnceLock::new();

/// Runtime configuration values, read from the flash storage once at boot.
struct RuntimeConfig {
    tz_std_offset_minutes: i16,
    tz_dst_enabled: bool,
}

impl RuntimeConfig {
    const fn new(tz_std_offset_minutes: i16, tz_dst_enabled: bool) -> Self {
        RuntimeConfig {
            tz_std_offset_minutes,
            tz_dst_enabled,
        }
    }
}

static RUNTIME_CONFIG: Mutex<CriticalSectionRawMutex, RuntimeConfig> = Mutex::new(
    RuntimeConfig::new(DEFAULT_TZ_STD_OFFSET_MINUTES, DEFAULT_TZ_DST_ENABLED),
);

/// Timezone for the face. Daylight saving follows the European rule when
/// enabled.
pub async fn get_timezone_rules() -> TimezoneRules {
    let config = RUNTIME_CONFIG.lock().await;
    TimezoneRules {
        std_offset_minutes: config.tz_std_offset_minutes,
        dst: if config.tz_dst_enabled {
            TimezoneRules::CENTRAL_EUROPE.dst
        } else {
            None
        },
    }
}

pub async fn init_config_manager() {
    if CONFIG_MANAGER.init(Mutex::new(ConfigManager::new())).is_err() {
        error!("Config manager initialized twice");
        return;
    }

    let mut config_manager = CONFIG_MANAGER.get().await.lock().await;

    let tz_std_offset_minutes = config_manager
        .get::<i16>(TZ_STD_OFFSET_CONFIG_KEY)
        .await
        .unwrap_or(None)
        .unwrap_or(DEFAULT_TZ_STD_OFFSET_MINUTES);
    let tz_dst_enabled = config_manager
        .get::<bool>(TZ_DST_ENABLED_CONFIG_KEY)
        .await
        .unwrap_or(None)
        .unwrap_or(DEFAULT_TZ_DST_ENABLED);

    let mut runtime_config = RUNTIME_CONFIG.lock().await;
    *runtime_config = RuntimeConfig::new(tz_std_offset_minutes, tz_dst_enabled);
    info!(
        "Runtime configuration: UTC{=i16} min, DST {}",
        tz_std_offset_minutes, tz_dst_enabled
    );
}

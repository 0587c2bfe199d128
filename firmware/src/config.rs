// GPS receiver on UART0
pub const GPS_BAUD_RATE: u32 = 9600;
pub const GPS_RX_BUFFER_SIZE: usize = 256;
// The lock tracker is polled at least this often, even if the UART is silent.
pub const GPS_READ_TIMEOUT_MS: u64 = 100; // ms

// Fixes dated before this year come from a receiver that has lost its almanac.
pub const FIRMWARE_BUILD_YEAR: i32 = 2025;

pub const POWER_SAMPLE_PERIOD_US: u64 = 1000; // us; one power-good sample per period

// Button hold times separating short, long and very long presses
pub const BUTTON_DEBOUNCE_MS: u64 = 20; // ms
pub const BUTTON_LONG_PRESS_MS: u64 = 1000; // ms
pub const BUTTON_VERY_LONG_PRESS_MS: u64 = 3000; // ms

pub const WATCHDOG_TIMEOUT_MS: u64 = 8000; // ms
pub const WATCHDOG_FEED_INTERVAL_MS: u64 = 1000; // ms

pub const FLASH_SIZE: usize = 2 * 1024 * 1024;
pub const FLASH_DATA_BUFFER_SIZE: usize = 128;

// Keys in the flash key/value map
pub const STATE_RECORD_KEY: u16 = 0x2001;

pub const DEFAULT_TZ_STD_OFFSET_MINUTES: i16 = 60; // CET
pub const TZ_STD_OFFSET_CONFIG_KEY: u16 = 0x2002;
pub const DEFAULT_TZ_DST_ENABLED: bool = true;
pub const TZ_DST_ENABLED_CONFIG_KEY: u16 = 0x2003;

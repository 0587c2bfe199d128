#![no_std]
#![no_main]

use clock_engine::bus::Bus;
use clock_engine::clock::LocalClock;
use clock_engine::store::PersistentStore;
use config::{FLASH_SIZE, WATCHDOG_TIMEOUT_MS};
use config_manager::{get_timezone_rules, init_config_manager};
use defmt::{error, info};
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::{flash::Async, watchdog::Watchdog};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex, once_lock::OnceLock};
use embassy_time::Duration;
use flash_store::{ClockStore, FlashStore, RamMirror};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

mod config;
mod config_manager;
mod config_resources;
mod flash_layout;
mod flash_store;
mod nmea_adapter;
mod tasks;

use crate::config_resources::{
    AssignedResources, ButtonResources, GpsUartResources, PowerGoodResources,
    PulseOutputResources,
};

pub type FlashType<'a> =
    embassy_rp::flash::Flash<'a, embassy_rp::peripherals::FLASH, Async, FLASH_SIZE>;
pub type MFlashType<'a> = Mutex<CriticalSectionRawMutex, FlashType<'a>>;
pub static OM_FLASH: OnceLock<MFlashType<'static>> = OnceLock::new();

pub static BUS: Bus = Bus::new();
pub static CLOCK: LocalClock = LocalClock::new();

static STORE: StaticCell<ClockStore> = StaticCell::new();

static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    let r = split_resources!(p);

    info!("Starting up...");

    // Until the feeder task runs, a hang anywhere in the boot sequence resets us
    let mut watchdog = Watchdog::new(p.WATCHDOG);
    watchdog.start(Duration::from_millis(WATCHDOG_TIMEOUT_MS));

    let flash = FlashType::new(p.FLASH, p.DMA_CH1);
    if OM_FLASH.init(Mutex::new(flash)).is_err() {
        error!("Failed to initialize flash");
        return;
    }

    init_config_manager().await;
    let rules = get_timezone_rules().await;

    let Some(mirror) = RamMirror::take() else {
        error!("State mirror already in use");
        return;
    };
    let store: &'static ClockStore = STORE.init(Mutex::new(PersistentStore::new(FlashStore, mirror)));
    let (state, source) = store.lock().await.load().await;
    info!(
        "State loaded from {:?}: face at {}, save count {}",
        source, state.face_position, state.save_count
    );

    // The tick source preempts everything else
    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high_spawner = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    high_spawner
        .spawn(tasks::second_tick::second_tick_task())
        .unwrap();

    spawner
        .spawn(tasks::timekeep::timekeep_task(
            r.pulse_outputs,
            state,
            rules,
            store,
        ))
        .unwrap();

    spawner
        .spawn(tasks::gps_input::gps_input_task(r.gps_uart))
        .unwrap();

    spawner
        .spawn(tasks::power_monitor::power_monitor_task(r.power_good, store))
        .unwrap();

    spawner
        .spawn(tasks::button_input::button_input_task(r.button))
        .unwrap();

    spawner.spawn(tasks::display::display_task()).unwrap();

    spawner
        .spawn(tasks::watchdog_feeder::watchdog_feeder_task(watchdog))
        .unwrap();
}

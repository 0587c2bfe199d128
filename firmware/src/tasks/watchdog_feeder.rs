use defmt::{debug, info};
use embassy_rp::watchdog::Watchdog;
use embassy_time::{Duration, Timer};

use crate::BUS;
use crate::config::WATCHDOG_FEED_INTERVAL_MS;

#[embassy_executor::task]
pub async fn watchdog_feeder_task(mut watchdog: Watchdog) {
    info!("Starting watchdog feeder task");

    loop {
        Timer::after(Duration::from_millis(WATCHDOG_FEED_INTERVAL_MS)).await;
        watchdog.feed();

        debug!("dropped messages: {}", BUS.dropped_messages());
    }
}

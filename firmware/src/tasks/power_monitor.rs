use clock_engine::bus::TaskId;
use clock_engine::power::{PowerEvent, PowerSupervisor};
use defmt::{debug, info};
use embassy_executor::task;
use embassy_rp::gpio::{Input, Pull};
use embassy_time::{Duration, Ticker};

use crate::BUS;
use crate::config::POWER_SAMPLE_PERIOD_US;
use crate::config_resources::PowerGoodResources;
use crate::flash_store::ClockStore;

#[task]
pub async fn power_monitor_task(r: PowerGoodResources, store: &'static ClockStore) {
    info!("Starting power monitor task");

    let power_good = Input::new(r.pin, Pull::None);
    let mut supervisor = PowerSupervisor::new(&BUS);
    let mut ticker = Ticker::every(Duration::from_micros(POWER_SAMPLE_PERIOD_US));

    info!("Power monitor task initialized");

    loop {
        ticker.next().await;
        match supervisor.sample(power_good.is_high(), store).await {
            Some(PowerEvent::Recovered) => {
                // Late shutdown replies are stale now
                while let Some(msg) = BUS.try_receive(TaskId::Power) {
                    debug!("Discarding {:?}", msg);
                }
            }
            Some(PowerEvent::Lost) | None => {}
        }
    }
}

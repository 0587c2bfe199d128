use defmt::{info, trace};
use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Ticker};

use crate::{BUS, CLOCK};

/// 1 Hz tick source. Runs on the high priority executor so timekeeping load
/// cannot delay it. A counter restart restarts the period as well.
#[embassy_executor::task]
pub async fn second_tick_task() {
    info!("Starting second tick task");

    let mut ticker = Ticker::every(Duration::from_secs(1));

    loop {
        match select(ticker.next(), CLOCK.wait_restart()).await {
            Either::First(()) => {
                CLOCK.on_second_tick(&BUS);
            }
            Either::Second(()) => {
                trace!("Tick period restarted");
                ticker.reset();
            }
        }
    }
}

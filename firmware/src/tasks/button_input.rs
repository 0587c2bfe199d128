use clock_engine::bus::{Message, Press, TaskId};
use defmt::{debug, info, warn};
use embassy_executor::task;
use embassy_rp::gpio::{Input, Pull};
use embassy_time::{Duration, Instant, Timer};

use crate::BUS;
use crate::config::{BUTTON_DEBOUNCE_MS, BUTTON_LONG_PRESS_MS, BUTTON_VERY_LONG_PRESS_MS};
use crate::config_resources::ButtonResources;

fn classify(held: Duration) -> Press {
    if held < Duration::from_millis(BUTTON_LONG_PRESS_MS) {
        Press::Short
    } else if held < Duration::from_millis(BUTTON_VERY_LONG_PRESS_MS) {
        Press::Long
    } else {
        Press::VeryLong
    }
}

#[task]
pub async fn button_input_task(r: ButtonResources) {
    info!("Starting button input task");

    let mut button = Input::new(r.pin, Pull::Up);

    info!("Button input task initialized");

    loop {
        button.wait_for_falling_edge().await;
        let pressed_at = Instant::now();
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;
        if button.is_high() {
            continue;
        }

        button.wait_for_high().await;
        let press = classify(pressed_at.elapsed());
        debug!("Button {:?}", press);

        if let Err(e) = BUS.send(TaskId::Timekeep, Message::ButtonPress(press)).await {
            warn!("Button press not delivered: {:?}", e);
        }
    }
}

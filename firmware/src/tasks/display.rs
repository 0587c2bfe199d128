use clock_engine::bus::{Message, TaskId};
use clock_engine::config::RECEIVE_TIMEOUT_MS;
use clock_engine::status::StatusBoard;
use defmt::{debug, info};
use embassy_executor::task;
use embassy_time::Duration;

use crate::BUS;

/// Headless display: renders the status line to the log once per second.
#[task]
pub async fn display_task() {
    info!("Starting display task");

    let mut board = StatusBoard::new();

    loop {
        let Some(msg) = BUS
            .receive(TaskId::Display, Duration::from_millis(RECEIVE_TIMEOUT_MS))
            .await
        else {
            continue;
        };
        if !board.apply(&msg) {
            continue;
        }

        match msg {
            Message::RefreshDisplay => info!("Display refreshed: {:?}", board.line()),
            Message::LocalTime(local) => debug!(
                "{}:{}:{} {:?}",
                local.hour,
                local.minute,
                local.second,
                board.line()
            ),
            _ => {}
        }
    }
}

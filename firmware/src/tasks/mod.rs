pub mod button_input;
pub mod display;
pub mod gps_input;
pub mod power_monitor;
pub mod second_tick;
pub mod timekeep;
pub mod watchdog_feeder;

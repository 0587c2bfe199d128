#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod clock;
pub mod commissioning;
pub mod config;
pub mod face;
pub mod gps;
pub mod logging;
pub mod power;
pub mod state;
pub mod status;
pub mod store;
pub mod timekeeper;
pub mod timezone;

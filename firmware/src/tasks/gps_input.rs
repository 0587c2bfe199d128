use clock_engine::bus::TaskId;
use clock_engine::gps::GpsLink;
use defmt::{info, trace, warn};
use embassy_executor::task;
use embassy_rp::bind_interrupts;
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, BufferedUartRx, Config};
use embassy_time::{Duration, Instant, with_timeout};
use embedded_io_async::Read;
use static_cell::StaticCell;

use crate::BUS;
use crate::config::{FIRMWARE_BUILD_YEAR, GPS_BAUD_RATE, GPS_READ_TIMEOUT_MS, GPS_RX_BUFFER_SIZE};
use crate::config_resources::GpsUartResources;
use crate::nmea_adapter::NmeaAdapter;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

#[task]
pub async fn gps_input_task(r: GpsUartResources) {
    info!("Starting GPS input task");

    static RX_BUFFER: StaticCell<[u8; GPS_RX_BUFFER_SIZE]> = StaticCell::new();
    let rx_buffer = &mut RX_BUFFER.init([0; GPS_RX_BUFFER_SIZE])[..];

    let mut config = Config::default();
    config.baudrate = GPS_BAUD_RATE;
    let mut rx = BufferedUartRx::new(r.uart, Irqs, r.rx, rx_buffer, config);

    let mut link = GpsLink::new(NmeaAdapter::new(FIRMWARE_BUILD_YEAR));
    let mut buf = [0u8; 64];

    info!("GPS input task initialized");

    loop {
        match with_timeout(Duration::from_millis(GPS_READ_TIMEOUT_MS), rx.read(&mut buf)).await {
            Ok(Ok(n)) => {
                let now_ms = Instant::now().as_millis();
                for &byte in &buf[..n] {
                    link.on_byte(byte, now_ms, &BUS).await;
                }
            }
            Ok(Err(e)) => warn!("GPS UART error: {:?}", e),
            Err(_) => trace!("GPS UART silent"),
        }
        link.poll(Instant::now().as_millis(), &BUS).await;

        while let Some(msg) = BUS.try_receive(TaskId::Gps) {
            link.handle(msg, &BUS).await;
        }
    }
}

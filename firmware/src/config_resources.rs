// Provide a mapping for the controller GPIO pins

//
//| GPIO # | Name      | Description                                                  |
//| ------ | --------- | ------------------------------------------------------------ |
//| 0      | GPS_TX    | UART0 TX to the GPS receiver. Not used.                      |
//| 1      | GPS_RX    | UART0 RX from the GPS receiver, NMEA 0183 at 9600 baud.      |
//| 2      | COIL_A    | Slave clock bridge, forward half. Active high.               |
//| 3      | COIL_B    | Slave clock bridge, reverse half. Active high.               |
//| 14     | USER_BTN  | Commissioning button. Pull-up, active low.                   |
//| 15     | PWR_GOOD  | Power-good from the supply monitor. Active high.             |

use assign_resources::assign_resources;
use embassy_rp::peripherals;

assign_resources! {
  /// GPIO pins for the controller
  gps_uart: GpsUartResources {
    uart: UART0,
    rx: PIN_1,
  },
  pulse_outputs: PulseOutputResources {
    coil_a: PIN_2,
    coil_b: PIN_3,
  },
  button: ButtonResources {
    pin: PIN_14,
  },
  power_good: PowerGoodResources {
    pin: PIN_15,
  },
}

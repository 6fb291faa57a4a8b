//! GPIO door adapter: bridges real pins to [`DoorPort`].
//!
//! Generic over `embedded-hal` 1.0 digital pins, so the same adapter drives
//! Linux sysfs lines through `linux-embedded-hal` on a host board or any
//! other HAL that implements the traits.  This is the only module that
//! touches the door's wiring.

use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, warn};

use crate::app::ports::DoorPort;
use crate::error::HardwareError;
use crate::fsm::SensorReading;

/// Two position switches plus the motor relay.
pub struct GpioDoorHardware<O, C, R> {
    open_sensor: O,
    close_sensor: C,
    relay: R,
    /// Switches pull the line low when asserted.
    active_low: bool,
}

impl<O, C, R> GpioDoorHardware<O, C, R>
where
    O: InputPin,
    C: InputPin,
    R: OutputPin,
{
    /// Take the pins and make sure the relay starts released.
    pub fn new(
        open_sensor: O,
        close_sensor: C,
        mut relay: R,
        active_low: bool,
    ) -> Result<Self, HardwareError> {
        relay.set_low().map_err(|_| HardwareError::RelayWrite)?;
        Ok(Self {
            open_sensor,
            close_sensor,
            relay,
            active_low,
        })
    }

    fn asserted(level_high: bool, active_low: bool) -> bool {
        level_high != active_low
    }
}

// ── Linux sysfs wiring ────────────────────────────────────────

#[cfg(target_os = "linux")]
mod sysfs {
    use embedded_hal::digital::PinState;
    use linux_embedded_hal::SysfsPin;
    use log::{error, info};

    use super::GpioDoorHardware;
    use crate::config::GpioPins;
    use crate::error::HardwareError;

    fn setup_failed(line: u32, what: &str, e: &dyn core::fmt::Debug) -> HardwareError {
        error!("GPIO: line {} {} failed: {:?}", line, what, e);
        HardwareError::PinSetup(line)
    }

    fn exported(line: u32) -> Result<SysfsPin, HardwareError> {
        let pin = SysfsPin::new(u64::from(line));
        pin.export().map_err(|e| setup_failed(line, "export", &e))?;
        Ok(pin)
    }

    fn input(line: u32) -> Result<SysfsPin, HardwareError> {
        exported(line)?
            .into_input_pin()
            .map_err(|e| setup_failed(line, "input setup", &e))
    }

    impl GpioDoorHardware<SysfsPin, SysfsPin, SysfsPin> {
        /// Export and configure the configured sysfs lines.  The relay line
        /// is driven low as soon as it becomes an output.
        pub fn from_sysfs(pins: &GpioPins) -> Result<Self, HardwareError> {
            info!(
                "GPIO: open sensor {}, close sensor {}, relay {}",
                pins.open_sensor, pins.close_sensor, pins.relay
            );
            let relay = exported(pins.relay)?
                .into_output_pin(PinState::Low)
                .map_err(|e| setup_failed(pins.relay, "output setup", &e))?;
            Self::new(
                input(pins.open_sensor)?,
                input(pins.close_sensor)?,
                relay,
                pins.sensors_active_low,
            )
        }
    }
}

// ── DoorPort implementation ───────────────────────────────────

impl<O, C, R> DoorPort for GpioDoorHardware<O, C, R>
where
    O: InputPin,
    C: InputPin,
    R: OutputPin,
{
    fn read_sensors(&mut self) -> Result<Option<SensorReading>, HardwareError> {
        let open_high = self
            .open_sensor
            .is_high()
            .map_err(|_| HardwareError::SensorRead)?;
        let close_high = self
            .close_sensor
            .is_high()
            .map_err(|_| HardwareError::SensorRead)?;
        Ok(Some(SensorReading {
            open_asserted: Self::asserted(open_high, self.active_low),
            close_asserted: Self::asserted(close_high, self.active_low),
        }))
    }

    fn engage_relay(&mut self) -> Result<(), HardwareError> {
        debug!("Relay engaged");
        self.relay.set_high().map_err(|_| HardwareError::RelayWrite)
    }

    fn release_relay(&mut self) -> Result<(), HardwareError> {
        if self.relay.set_low().is_err() {
            warn!("Relay release failed, retrying");
            self.relay
                .set_low()
                .map_err(|_| HardwareError::RelayWrite)?;
        }
        debug!("Relay released");
        Ok(())
    }
}

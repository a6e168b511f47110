//! Raspberry Pi platform backed by `rppal`.
//!
//! Pins are addressed by BCM number (`"20"`, `"GPIO20"`, `"BCM20"`); the bus is
//! `/dev/i2c-N` for the configured index.

use pihub_common::error::HardwareError;
use pihub_common::gpio::{Level, parse_bcm_pin};
use pihub_common::resources::{GpioPin, I2cBus, Platform};
use rppal::gpio::{Gpio, IoPin, Mode};
use rppal::i2c::I2c;
use tracing::info;

fn platform_error(err: impl std::fmt::Display) -> HardwareError {
    HardwareError::Platform(err.to_string())
}

fn to_rppal(level: Level) -> rppal::gpio::Level {
    match level {
        Level::Low => rppal::gpio::Level::Low,
        Level::High => rppal::gpio::Level::High,
    }
}

/// rppal-backed hardware backend.
pub struct RpiPlatform {
    gpio: Gpio,
    i2c_bus: u8,
}

impl RpiPlatform {
    /// Open the GPIO character device. The bus is opened later, on demand.
    pub fn new(i2c_bus: u8) -> Result<Self, HardwareError> {
        let gpio = Gpio::new().map_err(platform_error)?;
        info!("Raspberry Pi GPIO opened (I2C bus {})", i2c_bus);
        Ok(Self { gpio, i2c_bus })
    }
}

impl Platform for RpiPlatform {
    fn name(&self) -> &'static str {
        "rpi"
    }

    fn open_bus(&self) -> Result<Box<dyn I2cBus>, HardwareError> {
        let i2c = I2c::with_bus(self.i2c_bus)
            .map_err(|e| HardwareError::BusUnavailable(format!("/dev/i2c-{}: {e}", self.i2c_bus)))?;
        Ok(Box::new(RpiBus {
            i2c,
            current_address: None,
        }))
    }

    fn resolve_pin(&self, name: &str) -> Result<String, HardwareError> {
        parse_bcm_pin(name)
            .map(|n| format!("GPIO{n}"))
            .ok_or_else(|| HardwareError::PinNotFound(name.to_string()))
    }

    fn open_pin(&self, canonical: &str) -> Result<Box<dyn GpioPin>, HardwareError> {
        let number =
            parse_bcm_pin(canonical).ok_or_else(|| HardwareError::PinNotFound(canonical.to_string()))?;
        let pin = self.gpio.get(number).map_err(platform_error)?;
        Ok(Box::new(RpiPin {
            pin: pin.into_io(Mode::Input),
        }))
    }
}

struct RpiBus {
    i2c: I2c,
    current_address: Option<u16>,
}

impl RpiBus {
    fn select(&mut self, address: u16) -> Result<(), HardwareError> {
        if self.current_address == Some(address) {
            return Ok(());
        }
        self.i2c.set_addr_10bit(address > 0x7F).map_err(platform_error)?;
        self.i2c.set_slave_address(address).map_err(platform_error)?;
        self.current_address = Some(address);
        Ok(())
    }
}

impl I2cBus for RpiBus {
    fn transact(&mut self, address: u16, write: &[u8], read: &mut [u8]) -> Result<(), HardwareError> {
        self.select(address)?;
        let result = match (write.is_empty(), read.is_empty()) {
            (true, true) => Ok(()),
            (false, true) => self.i2c.write(write).map(|_| ()),
            (true, false) => self.i2c.read(read).map(|_| ()),
            (false, false) => self.i2c.write_read(write, read),
        };
        result.map_err(|e| HardwareError::Bus(format!("address {address:#04x}: {e}")))
    }
}

struct RpiPin {
    pin: IoPin,
}

impl GpioPin for RpiPin {
    fn set_output(&mut self, level: Level) -> Result<(), HardwareError> {
        self.pin.set_mode(Mode::Output);
        self.pin.write(to_rppal(level));
        Ok(())
    }

    fn set_input(&mut self) -> Result<(), HardwareError> {
        self.pin.set_mode(Mode::Input);
        Ok(())
    }

    fn read(&mut self) -> Result<Level, HardwareError> {
        Ok(Level::from(self.pin.is_high()))
    }

    fn set_pwm(&mut self, frequency_hz: f64, duty_cycle: f64) -> Result<(), HardwareError> {
        self.pin.set_mode(Mode::Output);
        self.pin
            .set_pwm_frequency(frequency_hz, duty_cycle)
            .map_err(platform_error)
    }

    fn clear_pwm(&mut self) -> Result<(), HardwareError> {
        self.pin.clear_pwm().map_err(platform_error)
    }
}

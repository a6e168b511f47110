//! AM2301 (DHT21) single-wire humidity/temperature sensor.
//!
//! Config: `{"pin": "4"}`. Action `read` returns `{"rh": 45.3, "temperature_c": 21.7}`.
//!
//! The host pulls the line low for 1 ms to request a measurement, releases
//! it and the sensor answers with an ACK pulse, a start bit and 40 data bits.
//! Each bit is a low/high pair; a high phase of 50 us or more encodes a one.
//! The frame is humidity (16 bits, tenths of a percent), temperature
//! (15 bits magnitude + sign bit, tenths of a degree) and an 8-bit checksum.

use pihub_common::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_IDLE: Duration = Duration::from_micros(100);
const REQUEST_LOW: Duration = Duration::from_micros(1000);
const ACK_TIMEOUT: Duration = Duration::from_micros(100);
const START_BIT_TIMEOUT: Duration = Duration::from_micros(200);
const BIT_TIMEOUT: Duration = Duration::from_micros(500);
const ONE_THRESHOLD: Duration = Duration::from_micros(50);

/// One decoded measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Relative humidity in percent.
    pub rh: f64,
    /// Temperature in degrees Celsius.
    pub temperature_c: f64,
}

impl Reading {
    /// Within the sensor's specified range.
    pub fn is_valid(&self) -> bool {
        (0.0..=100.0).contains(&self.rh) && (-40.0..=80.0).contains(&self.temperature_c)
    }
}

/// Decode a 5-byte frame.
pub fn parse_frame(frame: [u8; 5]) -> Result<Reading, HardwareError> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return Err(HardwareError::InvalidReading(format!(
            "checksum mismatch: computed {sum:#04x}, frame says {:#04x}",
            frame[4]
        )));
    }

    let rh = u16::from_be_bytes([frame[0], frame[1]]) as f64 / 10.0;
    let magnitude = u16::from_be_bytes([frame[2] & 0x7F, frame[3]]) as f64 / 10.0;
    let temperature_c = if frame[2] & 0x80 != 0 { -magnitude } else { magnitude };

    Ok(Reading { rh, temperature_c })
}

/// Sensor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Am2301Config {
    /// Data pin.
    pub pin: String,
}

impl Bindable for Am2301Config {
    fn validate(&self) -> Result<(), String> {
        if self.pin.trim().is_empty() {
            return Err("pin is required".to_string());
        }
        Ok(())
    }
}

/// AM2301 driver.
#[derive(Default)]
pub struct Am2301Module {
    pin: Option<Arc<SharedPin>>,
}

/// Registry factory.
pub fn create_module() -> Box<dyn Module> {
    Box::new(Am2301Module::default())
}

fn expect_level(
    line: &mut PinGuard<'_>,
    level: Level,
    timeout: Duration,
    step: &str,
) -> Result<Duration, HardwareError> {
    match wait_for_level(line, level, timeout) {
        Ok(elapsed) => Ok(elapsed),
        Err(_) => Err(HardwareError::Timeout(format!(
            "AM2301 on {}: no {level} during {step}",
            line.name()
        ))),
    }
}

fn request(line: &mut PinGuard<'_>) -> Result<(), HardwareError> {
    line.set_output(Level::High)?;
    thread::sleep(REQUEST_IDLE);
    line.set_output(Level::Low)?;
    thread::sleep(REQUEST_LOW);
    line.set_output(Level::High)?;
    line.set_input()?;

    expect_level(line, Level::High, ACK_TIMEOUT, "release")?;
    expect_level(line, Level::Low, ACK_TIMEOUT, "ack")?;
    expect_level(line, Level::High, ACK_TIMEOUT, "ack")?;
    expect_level(line, Level::Low, START_BIT_TIMEOUT, "start bit")?;
    expect_level(line, Level::High, START_BIT_TIMEOUT, "start bit")?;
    Ok(())
}

fn read_frame(line: &mut PinGuard<'_>) -> Result<[u8; 5], HardwareError> {
    let mut frame = [0u8; 5];
    for byte in frame.iter_mut() {
        for bit in (0..8).rev() {
            let high_for = expect_level(line, Level::Low, BIT_TIMEOUT, "data bit")?;
            if high_for >= ONE_THRESHOLD {
                *byte |= 1 << bit;
            }
            expect_level(line, Level::High, BIT_TIMEOUT, "data bit")?;
        }
    }
    Ok(frame)
}

impl Am2301Module {
    fn measure(&self) -> Result<Reading, ModuleError> {
        let pin = self
            .pin
            .as_ref()
            .ok_or_else(|| ModuleError::not_initialized("read"))?;

        // Nobody else may touch the line between the start pulse and the last bit.
        let mut line = pin.lock();
        let frame = request(&mut line).and_then(|()| read_frame(&mut line));
        // Park the line high whether or not the frame arrived.
        if let Err(err) = line.set_output(Level::High) {
            warn!("AM2301 on {}: failed to release line: {}", line.name(), err);
        }
        drop(line);
        let frame = frame?;
        debug!("AM2301 on {} frame {:02x?}", pin.name(), frame);

        let reading = parse_frame(frame)?;
        if !reading.is_valid() {
            return Err(HardwareError::InvalidReading(format!(
                "out of range: {}% RH, {} degC",
                reading.rh, reading.temperature_c
            ))
            .into());
        }
        Ok(reading)
    }
}

impl Module for Am2301Module {
    fn kind(&self) -> &'static str {
        "am2301"
    }

    fn initialize(
        &mut self,
        resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError> {
        let config: Am2301Config = config.bind()?;
        let pin = resources.pin_by_name(&config.pin)?;
        // Idle state of the bus is high.
        pin.set_output(Level::High)?;
        self.pin = Some(pin);
        Ok(())
    }

    fn act(&mut self, action: &str, _request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        match action {
            "read" => to_result(self.measure()?),
            _ => Err(ModuleError::unknown_action(action)),
        }
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        self.pin = None;
        Ok(())
    }
}

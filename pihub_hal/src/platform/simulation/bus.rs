//! Simulated I2C bus and devices.
//!
//! The bus routes each transaction to the device registered at its address
//! (unknown addresses NACK) and keeps counters the tests use to prove that
//! transactions never overlap.

use super::SimInner;
use parking_lot::Mutex;
use pihub_common::error::HardwareError;
use pihub_common::resources::I2cBus;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// A device living on the simulated bus.
pub trait SimDevice: Send {
    /// Handle one write-then-read transaction addressed to this device.
    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), HardwareError>;
}

/// `I2cBus` handed to the resource provider.
pub(crate) struct SimBus {
    inner: Arc<SimInner>,
}

impl SimBus {
    pub(crate) fn new(inner: Arc<SimInner>) -> Self {
        Self { inner }
    }
}

impl I2cBus for SimBus {
    fn transact(&mut self, address: u16, write: &[u8], read: &mut [u8]) -> Result<(), HardwareError> {
        let inner = &self.inner;
        if inner.in_flight.swap(true, Ordering::AcqRel) {
            inner.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let delay = *inner.transaction_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let result = match inner.devices.lock().get_mut(&address) {
            Some(device) => device.transact(write, read),
            None => Err(HardwareError::Nack { address }),
        };

        inner.transactions.fetch_add(1, Ordering::SeqCst);
        inner.in_flight.store(false, Ordering::Release);
        result
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        self.inner.bus_closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Full-scale voltage for each ADS1115 PGA setting.
const ADS_FULL_SCALE: [f64; 8] = [6.144, 4.096, 2.048, 1.024, 0.512, 0.256, 0.256, 0.256];

/// ADS1115 analog-to-digital converter with settable input voltages.
///
/// Conversions complete immediately: writing a config word with the OS bit
/// set latches the selected channel into the conversion register.
/// Clones share the input voltages.
#[derive(Clone)]
pub struct SimAds1115 {
    voltages: Arc<Mutex<[f64; 4]>>,
    pointer: u8,
    config: u16,
    conversion: i16,
}

impl SimAds1115 {
    /// Create a converter with all inputs at 0 V.
    pub fn new() -> Self {
        Self {
            voltages: Arc::new(Mutex::new([0.0; 4])),
            pointer: 0,
            config: 0x8583,
            conversion: 0,
        }
    }

    /// Create a converter with the given input voltages.
    pub fn with_voltages(voltages: [f64; 4]) -> Self {
        let ads = Self::new();
        *ads.voltages.lock() = voltages;
        ads
    }

    /// Set the voltage on single-ended input `channel`.
    pub fn set_voltage(&self, channel: usize, volts: f64) {
        self.voltages.lock()[channel] = volts;
    }

    fn convert(&mut self) {
        let mux = (self.config >> 12) & 0x7;
        let volts = if mux >= 4 {
            self.voltages.lock()[(mux - 4) as usize]
        } else {
            // Differential inputs are not modelled.
            0.0
        };
        let full_scale = ADS_FULL_SCALE[((self.config >> 9) & 0x7) as usize];
        let raw = (volts / full_scale * 32768.0).round().clamp(-32768.0, 32767.0);
        self.conversion = raw as i16;
    }
}

impl Default for SimAds1115 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice for SimAds1115 {
    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), HardwareError> {
        if let Some((&pointer, payload)) = write.split_first() {
            if pointer > 0x03 {
                return Err(HardwareError::Bus(format!("ADS1115: no register {pointer:#04x}")));
            }
            self.pointer = pointer;
            if pointer == 0x01 && payload.len() >= 2 {
                self.config = u16::from_be_bytes([payload[0], payload[1]]);
                if self.config & 0x8000 != 0 {
                    self.convert();
                }
                // Single-shot conversion is already done.
                self.config |= 0x8000;
            }
        }

        let register = match self.pointer {
            0x00 => self.conversion.to_be_bytes(),
            0x01 => self.config.to_be_bytes(),
            _ => [0, 0],
        };
        for (dst, src) in read.iter_mut().zip(register.iter().chain(std::iter::repeat(&0))) {
            *dst = *src;
        }
        Ok(())
    }
}

/// Generic register-file device (256 byte registers, auto-incrementing pointer).
///
/// A write sets the pointer from its first byte and stores the rest; a read
/// returns registers starting at the pointer. Clones share the registers.
#[derive(Clone)]
pub struct RegisterDevice {
    registers: Arc<Mutex<[u8; 256]>>,
    pointer: u8,
}

impl RegisterDevice {
    /// Create a device with all registers zeroed.
    pub fn new() -> Self {
        Self {
            registers: Arc::new(Mutex::new([0; 256])),
            pointer: 0,
        }
    }

    /// Read register `reg`.
    pub fn register(&self, reg: u8) -> u8 {
        self.registers.lock()[reg as usize]
    }

    /// Write register `reg`.
    pub fn set_register(&self, reg: u8, value: u8) {
        self.registers.lock()[reg as usize] = value;
    }
}

impl Default for RegisterDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice for RegisterDevice {
    fn transact(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), HardwareError> {
        let mut registers = self.registers.lock();
        if let Some((&pointer, payload)) = write.split_first() {
            self.pointer = pointer;
            for (offset, byte) in payload.iter().enumerate() {
                registers[pointer.wrapping_add(offset as u8) as usize] = *byte;
            }
        }
        for (offset, dst) in read.iter_mut().enumerate() {
            *dst = registers[self.pointer.wrapping_add(offset as u8) as usize];
        }
        Ok(())
    }
}

//! Simulation platform.
//!
//! An in-memory board: a bus populated with simulated devices and a BCM pin
//! namespace (`GPIO0`..`GPIO27`). The platform handle is cheap to clone; all
//! clones observe the same bus and pins, so tests keep one clone to inspect
//! what the modules did through the resource provider.

mod bus;
mod pins;

pub use bus::{RegisterDevice, SimAds1115, SimDevice};
pub use pins::{PinMode, PinSnapshot, PwmSetting};

use bus::SimBus;
use parking_lot::Mutex;
use pihub_common::error::HardwareError;
use pihub_common::gpio::{Level, parse_bcm_pin};
use pihub_common::resources::{GpioPin, I2cBus, Platform};
use pins::{PinState, SimPin};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

pub(crate) struct SimInner {
    devices: Mutex<BTreeMap<u16, Box<dyn SimDevice>>>,
    pins: Mutex<HashMap<String, Arc<Mutex<PinState>>>>,
    bus_available: AtomicBool,
    transaction_delay: Mutex<Duration>,
    bus_opens: AtomicUsize,
    bus_closes: AtomicUsize,
    transactions: AtomicUsize,
    overlaps: AtomicUsize,
    in_flight: AtomicBool,
}

/// In-memory hardware backend.
#[derive(Clone)]
pub struct SimulatedPlatform {
    inner: Arc<SimInner>,
}

impl SimulatedPlatform {
    /// An empty board: no bus devices, all pins low.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SimInner {
                devices: Mutex::new(BTreeMap::new()),
                pins: Mutex::new(HashMap::new()),
                bus_available: AtomicBool::new(true),
                transaction_delay: Mutex::new(Duration::ZERO),
                bus_opens: AtomicUsize::new(0),
                bus_closes: AtomicUsize::new(0),
                transactions: AtomicUsize::new(0),
                overlaps: AtomicUsize::new(0),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Builder form of [`add_device`](Self::add_device).
    pub fn with_device(self, address: u16, device: impl SimDevice + 'static) -> Self {
        self.add_device(address, device);
        self
    }

    /// Hold every bus transaction for `delay` (widens race windows in tests).
    pub fn with_transaction_delay(self, delay: Duration) -> Self {
        *self.inner.transaction_delay.lock() = delay;
        self
    }

    /// Make `open_bus` fail, as on a board without I2C enabled.
    pub fn without_bus(self) -> Self {
        self.inner.bus_available.store(false, Ordering::Release);
        self
    }

    /// Attach `device` at `address`, replacing whatever was there.
    pub fn add_device(&self, address: u16, device: impl SimDevice + 'static) {
        debug!("Simulated device attached at {:#04x}", address);
        self.inner.devices.lock().insert(address, Box::new(device));
    }

    /// How many times the bus was opened.
    pub fn bus_opens(&self) -> usize {
        self.inner.bus_opens.load(Ordering::SeqCst)
    }

    /// How many times the bus was closed.
    pub fn bus_closes(&self) -> usize {
        self.inner.bus_closes.load(Ordering::SeqCst)
    }

    /// Completed bus transactions.
    pub fn transactions(&self) -> usize {
        self.inner.transactions.load(Ordering::SeqCst)
    }

    /// Transactions that started while another was still in flight.
    pub fn overlapping_transactions(&self) -> usize {
        self.inner.overlaps.load(Ordering::SeqCst)
    }

    /// State of a pin, if anything has touched it. Accepts any pin alias.
    pub fn pin(&self, name: &str) -> Option<PinSnapshot> {
        let canonical = self.resolve_pin(name).ok()?;
        self.inner
            .pins
            .lock()
            .get(&canonical)
            .map(|state| state.lock().snapshot())
    }

    /// Set the level an input pin reads once its script is exhausted.
    pub fn set_input_level(&self, name: &str, level: Level) -> Result<(), HardwareError> {
        self.pin_state(name)?.lock().set_level(level);
        Ok(())
    }

    /// Queue levels the pin returns on its next reads, oldest first.
    pub fn script_input(
        &self,
        name: &str,
        levels: impl IntoIterator<Item = Level>,
    ) -> Result<(), HardwareError> {
        self.pin_state(name)?.lock().script(levels);
        Ok(())
    }

    fn pin_state(&self, name: &str) -> Result<Arc<Mutex<PinState>>, HardwareError> {
        let canonical = self.resolve_pin(name)?;
        Ok(Arc::clone(self.inner.pins.lock().entry(canonical).or_default()))
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimulatedPlatform {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn open_bus(&self) -> Result<Box<dyn I2cBus>, HardwareError> {
        if !self.inner.bus_available.load(Ordering::Acquire) {
            return Err(HardwareError::BusUnavailable(
                "simulated board has no I2C bus".to_string(),
            ));
        }
        self.inner.bus_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimBus::new(Arc::clone(&self.inner))))
    }

    fn resolve_pin(&self, name: &str) -> Result<String, HardwareError> {
        parse_bcm_pin(name)
            .map(|n| format!("GPIO{n}"))
            .ok_or_else(|| HardwareError::PinNotFound(name.to_string()))
    }

    fn open_pin(&self, canonical: &str) -> Result<Box<dyn GpioPin>, HardwareError> {
        Ok(Box::new(SimPin::new(self.pin_state(canonical)?)))
    }
}

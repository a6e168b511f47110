//! Shared physical resources.
//!
//! The board has exactly one default I2C bus and one GPIO pin namespace.
//! [`ResourceProvider`] owns both: it opens them lazily through a
//! [`Platform`] backend, caches the handles and hands out `Arc` references so
//! every module talks to the same underlying resource.
//!
//! Serialization happens at the handle, not in the module table:
//! - [`SharedBus`] runs one transaction at a time; [`SharedBus::lock`] keeps
//!   the bus for a multi-transaction sequence (e.g. ADC config + conversion)
//! - [`SharedPin`] guards each pin operation

use crate::error::HardwareError;
use crate::gpio::Level;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Raw I2C bus as exposed by a platform.
pub trait I2cBus: Send {
    /// Write `write` to `address`, then read `read.len()` bytes back.
    ///
    /// Either buffer may be empty.
    fn transact(&mut self, address: u16, write: &[u8], read: &mut [u8])
    -> Result<(), HardwareError>;

    /// Release the underlying bus.
    fn close(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Raw digital pin as exposed by a platform.
pub trait GpioPin: Send {
    /// Switch to output mode and drive `level`.
    fn set_output(&mut self, level: Level) -> Result<(), HardwareError>;

    /// Switch to input mode.
    fn set_input(&mut self) -> Result<(), HardwareError>;

    /// Sample the current level.
    fn read(&mut self) -> Result<Level, HardwareError>;

    /// Start PWM output with `duty_cycle` in `0.0..=1.0`.
    fn set_pwm(&mut self, frequency_hz: f64, duty_cycle: f64) -> Result<(), HardwareError>;

    /// Stop PWM output.
    fn clear_pwm(&mut self) -> Result<(), HardwareError>;
}

/// Hardware backend the provider opens resources through.
pub trait Platform: Send + Sync {
    /// Short identifier (e.g. "simulation", "rpi").
    fn name(&self) -> &'static str;

    /// Open the default I2C bus.
    fn open_bus(&self) -> Result<Box<dyn I2cBus>, HardwareError>;

    /// Map a client-facing pin name onto the platform's canonical pin name.
    ///
    /// Fails with [`HardwareError::PinNotFound`] for names outside the namespace.
    fn resolve_pin(&self, name: &str) -> Result<String, HardwareError>;

    /// Open a pin by its canonical name.
    fn open_pin(&self, canonical: &str) -> Result<Box<dyn GpioPin>, HardwareError>;
}

/// Provider-owned handle to the default I2C bus.
pub struct SharedBus {
    inner: Mutex<Box<dyn I2cBus>>,
    closed: AtomicBool,
}

impl SharedBus {
    fn new(bus: Box<dyn I2cBus>) -> Self {
        Self {
            inner: Mutex::new(bus),
            closed: AtomicBool::new(false),
        }
    }

    /// Run a single transaction.
    pub fn transact(&self, address: u16, write: &[u8], read: &mut [u8]) -> Result<(), HardwareError> {
        self.lock()?.transact(address, write, read)
    }

    /// Take the bus for a sequence of transactions.
    ///
    /// Other users block until the returned guard is dropped.
    pub fn lock(&self) -> Result<BusGuard<'_>, HardwareError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HardwareError::Closed);
        }
        Ok(BusGuard {
            inner: self.inner.lock(),
        })
    }

    fn close(&self) -> Result<(), HardwareError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.lock().close()
    }
}

/// Exclusive access to the bus for the lifetime of the guard.
pub struct BusGuard<'a> {
    inner: MutexGuard<'a, Box<dyn I2cBus>>,
}

impl BusGuard<'_> {
    /// Run one transaction while holding the bus.
    pub fn transact(&mut self, address: u16, write: &[u8], read: &mut [u8]) -> Result<(), HardwareError> {
        self.inner.transact(address, write, read)
    }
}

/// A device at a fixed address on a shared bus.
#[derive(Clone)]
pub struct I2cDevice {
    bus: Arc<SharedBus>,
    address: u16,
}

impl I2cDevice {
    /// Bind `address` on `bus`.
    pub fn new(bus: Arc<SharedBus>, address: u16) -> Self {
        Self { bus, address }
    }

    /// Device address.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Single write-then-read transaction.
    pub fn tx(&self, write: &[u8], read: &mut [u8]) -> Result<(), HardwareError> {
        self.bus.transact(self.address, write, read)
    }

    /// The bus this device lives on.
    pub fn bus(&self) -> &Arc<SharedBus> {
        &self.bus
    }
}

/// Provider-owned handle to one GPIO pin.
///
/// Several modules may hold the same pin. Each method below is one locked
/// step; protocols that need a run of steps without interference take the
/// pin with [`SharedPin::lock`].
pub struct SharedPin {
    name: String,
    inner: Mutex<Box<dyn GpioPin>>,
    cached: AtomicBool,
}

impl SharedPin {
    fn new(name: String, pin: Box<dyn GpioPin>) -> Self {
        Self {
            name,
            inner: Mutex::new(pin),
            cached: AtomicBool::new(true),
        }
    }

    /// Canonical pin name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the pin for a sequence of operations.
    ///
    /// Other users block until the returned guard is dropped.
    pub fn lock(&self) -> PinGuard<'_> {
        PinGuard {
            name: &self.name,
            inner: self.inner.lock(),
        }
    }

    /// True when some handle other than `this` and the provider's cache
    /// still refers to the pin, i.e. another module holds it.
    pub fn held_elsewhere(this: &Arc<SharedPin>) -> bool {
        let cache = usize::from(this.cached.load(Ordering::Acquire));
        Arc::strong_count(this) > 1 + cache
    }

    /// Drive the pin as an output.
    pub fn set_output(&self, level: Level) -> Result<(), HardwareError> {
        self.lock().set_output(level)
    }

    /// Switch the pin to input mode.
    pub fn set_input(&self) -> Result<(), HardwareError> {
        self.lock().set_input()
    }

    /// Sample the pin.
    pub fn read(&self) -> Result<Level, HardwareError> {
        self.lock().read()
    }

    /// Start PWM output.
    pub fn set_pwm(&self, frequency_hz: f64, duty_cycle: f64) -> Result<(), HardwareError> {
        self.inner.lock().set_pwm(frequency_hz, duty_cycle)
    }

    /// Stop PWM output.
    pub fn clear_pwm(&self) -> Result<(), HardwareError> {
        self.inner.lock().clear_pwm()
    }
}

/// Exclusive access to one pin for the lifetime of the guard.
pub struct PinGuard<'a> {
    name: &'a str,
    inner: MutexGuard<'a, Box<dyn GpioPin>>,
}

impl PinGuard<'_> {
    /// Canonical pin name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Drive the pin as an output.
    pub fn set_output(&mut self, level: Level) -> Result<(), HardwareError> {
        self.inner.set_output(level)
    }

    /// Switch the pin to input mode.
    pub fn set_input(&mut self) -> Result<(), HardwareError> {
        self.inner.set_input()
    }

    /// Sample the pin.
    pub fn read(&mut self) -> Result<Level, HardwareError> {
        self.inner.read()
    }
}

/// Owner of the process-wide bus and pin handles.
///
/// Constructed once at startup and passed by reference to every module.
pub struct ResourceProvider {
    platform: Box<dyn Platform>,
    bus: Mutex<Option<Arc<SharedBus>>>,
    pins: Mutex<HashMap<String, Arc<SharedPin>>>,
    closed: AtomicBool,
}

impl ResourceProvider {
    /// Create a provider over `platform`. Nothing is opened yet.
    pub fn new(platform: Box<dyn Platform>) -> Self {
        info!("Resource provider created on platform '{}'", platform.name());
        Self {
            platform,
            bus: Mutex::new(None),
            pins: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Name of the backing platform.
    pub fn platform_name(&self) -> &'static str {
        self.platform.name()
    }

    /// The default I2C bus, opened on first use and cached afterwards.
    pub fn default_bus(&self) -> Result<Arc<SharedBus>, HardwareError> {
        self.ensure_open()?;
        let mut slot = self.bus.lock();
        if let Some(bus) = slot.as_ref() {
            return Ok(Arc::clone(bus));
        }

        let bus = Arc::new(SharedBus::new(self.platform.open_bus()?));
        info!("Opened default I2C bus on '{}'", self.platform.name());
        *slot = Some(Arc::clone(&bus));
        Ok(bus)
    }

    /// Resolve a pin from the platform's namespace.
    ///
    /// Aliases of the same physical pin (`"20"`, `"GPIO20"`) share one handle.
    pub fn pin_by_name(&self, name: &str) -> Result<Arc<SharedPin>, HardwareError> {
        self.ensure_open()?;
        let canonical = self.platform.resolve_pin(name)?;
        let mut pins = self.pins.lock();
        if let Some(pin) = pins.get(&canonical) {
            return Ok(Arc::clone(pin));
        }

        let pin = Arc::new(SharedPin::new(
            canonical.clone(),
            self.platform.open_pin(&canonical)?,
        ));
        debug!("Opened pin {} (requested as '{}')", canonical, name);
        pins.insert(canonical, Arc::clone(&pin));
        Ok(pin)
    }

    /// Release the bus and forget all pins. Called once at shutdown.
    pub fn close(&self) -> Result<(), HardwareError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            warn!("Resource provider closed twice");
            return Ok(());
        }

        for (_, pin) in self.pins.lock().drain() {
            pin.cached.store(false, Ordering::Release);
        }
        match self.bus.lock().take() {
            Some(bus) => {
                info!("Closing default I2C bus");
                bus.close()
            }
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), HardwareError> {
        if self.closed.load(Ordering::Acquire) {
            Err(HardwareError::Closed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct NullBus {
        closes: Arc<AtomicUsize>,
    }

    impl I2cBus for NullBus {
        fn transact(&mut self, _: u16, _: &[u8], read: &mut [u8]) -> Result<(), HardwareError> {
            read.fill(0xAB);
            Ok(())
        }

        fn close(&mut self) -> Result<(), HardwareError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NullPin(Level);

    impl GpioPin for NullPin {
        fn set_output(&mut self, level: Level) -> Result<(), HardwareError> {
            self.0 = level;
            Ok(())
        }
        fn set_input(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
        fn read(&mut self) -> Result<Level, HardwareError> {
            Ok(self.0)
        }
        fn set_pwm(&mut self, _: f64, _: f64) -> Result<(), HardwareError> {
            Ok(())
        }
        fn clear_pwm(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingPlatform {
        bus_opens: Arc<AtomicUsize>,
        pin_opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl Platform for CountingPlatform {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn open_bus(&self) -> Result<Box<dyn I2cBus>, HardwareError> {
            self.bus_opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullBus {
                closes: Arc::clone(&self.closes),
            }))
        }

        fn resolve_pin(&self, name: &str) -> Result<String, HardwareError> {
            crate::gpio::parse_bcm_pin(name)
                .map(|n| format!("GPIO{n}"))
                .ok_or_else(|| HardwareError::PinNotFound(name.to_string()))
        }

        fn open_pin(&self, _canonical: &str) -> Result<Box<dyn GpioPin>, HardwareError> {
            self.pin_opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NullPin(Level::Low)))
        }
    }

    fn provider() -> (ResourceProvider, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let platform = CountingPlatform::default();
        let counters = (
            Arc::clone(&platform.bus_opens),
            Arc::clone(&platform.pin_opens),
            Arc::clone(&platform.closes),
        );
        (
            ResourceProvider::new(Box::new(platform)),
            counters.0,
            counters.1,
            counters.2,
        )
    }

    #[test]
    fn test_default_bus_opened_once() {
        let (provider, bus_opens, _, _) = provider();
        let first = provider.default_bus().unwrap();
        for _ in 0..10 {
            let again = provider.default_bus().unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(bus_opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_bus_concurrent_open_once() {
        let (provider, bus_opens, _, _) = provider();
        let provider = Arc::new(provider);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                thread::spawn(move || provider.default_bus().unwrap())
            })
            .collect();
        let buses: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(buses.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(bus_opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pin_aliases_share_handle() {
        let (provider, _, pin_opens, _) = provider();
        let a = provider.pin_by_name("20").unwrap();
        let b = provider.pin_by_name("GPIO20").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "GPIO20");
        assert_eq!(pin_opens.load(Ordering::SeqCst), 1);

        a.set_output(Level::High).unwrap();
        assert_eq!(b.read().unwrap(), Level::High);
    }

    #[test]
    fn test_pin_guard_holds_off_other_writers() {
        let (provider, _, _, _) = provider();
        let provider = Arc::new(provider);
        let pin = provider.pin_by_name("4").unwrap();
        let other = provider.pin_by_name("GPIO4").unwrap();
        let wrote = Arc::new(AtomicBool::new(false));

        let mut line = pin.lock();
        line.set_output(Level::Low).unwrap();
        let writer = {
            let wrote = Arc::clone(&wrote);
            thread::spawn(move || {
                other.set_output(Level::High).unwrap();
                wrote.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!wrote.load(Ordering::SeqCst));
        assert_eq!(line.read().unwrap(), Level::Low);
        drop(line);

        writer.join().unwrap();
        assert!(wrote.load(Ordering::SeqCst));
        assert_eq!(pin.read().unwrap(), Level::High);
    }

    #[test]
    fn test_held_elsewhere_counts_other_holders() {
        let (provider, _, _, _) = provider();
        let mine = provider.pin_by_name("17").unwrap();
        assert!(!SharedPin::held_elsewhere(&mine));

        let theirs = provider.pin_by_name("GPIO17").unwrap();
        assert!(SharedPin::held_elsewhere(&mine));
        drop(theirs);
        assert!(!SharedPin::held_elsewhere(&mine));

        provider.close().unwrap();
        assert!(!SharedPin::held_elsewhere(&mine));
    }

    #[test]
    fn test_unknown_pin_not_found() {
        let (provider, _, _, _) = provider();
        let err = provider.pin_by_name("P9_42").err().unwrap();
        assert_eq!(err, HardwareError::PinNotFound("P9_42".to_string()));
    }

    #[test]
    fn test_close_releases_bus() {
        let (provider, _, _, closes) = provider();
        let bus = provider.default_bus().unwrap();
        let mut buf = [0u8; 1];
        bus.transact(0x20, &[0x00], &mut buf).unwrap();
        assert_eq!(buf, [0xAB]);

        provider.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(bus.transact(0x20, &[], &mut buf), Err(HardwareError::Closed));
        assert_eq!(provider.default_bus().err(), Some(HardwareError::Closed));
        assert_eq!(provider.pin_by_name("4").err(), Some(HardwareError::Closed));

        // Second close is a no-op.
        provider.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_without_bus() {
        let (provider, _, _, closes) = provider();
        provider.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }
}

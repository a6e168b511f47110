//! Built-in driver modules.
//!
//! - [`echo`] - Returns its request, no hardware
//! - [`relay`] - Digital output on one pin
//! - [`i2c`] - Raw write/read transactions with one bus device
//! - [`ads1115`] - Single-ended ADS1115 channel
//! - [`htg3535ch`] - NTC temperature + humidity probe behind an ADS1115
//! - [`am2301`] - Single-wire humidity/temperature sensor
//! - [`servo`] - PWM hobby servo
//! - [`hcsr04`] - Ultrasonic rangefinder (also registered as `hcsro4`)
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `Module` trait from `pihub_common::module`
//! 3. Register its factory in [`register_builtin_modules`]

pub mod ads1115;
pub mod am2301;
pub mod echo;
pub mod hcsr04;
pub mod htg3535ch;
pub mod i2c;
pub mod relay;
pub mod servo;

use crate::module_registry::ModuleRegistry;

/// Register every built-in driver kind.
pub fn register_builtin_modules(registry: &mut ModuleRegistry) {
    registry.register("echo", echo::create_module);
    registry.register("relay", relay::create_module);
    registry.register("i2c", i2c::create_module);
    registry.register("ads", ads1115::create_module);
    registry.register("htg3535ch", htg3535ch::create_module);
    registry.register("am2301", am2301::create_module);
    registry.register("servo", servo::create_module);
    registry.register("hcsr04", hcsr04::create_module);
    // Spelling used by existing clients.
    registry.register("hcsro4", hcsr04::create_module);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pihub_common::module::Module;

    #[test]
    fn test_builtin_sources() {
        let registry = ModuleRegistry::with_builtin_modules();
        assert_eq!(
            registry.list_sources(),
            vec![
                "ads", "am2301", "echo", "hcsr04", "hcsro4", "htg3535ch", "i2c", "relay", "servo"
            ]
        );
    }

    #[test]
    fn test_rangefinder_alias_builds_same_driver() {
        let registry = ModuleRegistry::with_builtin_modules();
        let module = registry.create_module("hcsro4").unwrap();
        assert_eq!(module.kind(), "hcsr04");
    }
}

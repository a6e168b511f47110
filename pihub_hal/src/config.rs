//! Hardware section of the hub configuration.
//!
//! ```toml
//! [hardware]
//! platform = "simulation"
//! i2c_bus = 1
//!
//! [[hardware.simulation.devices]]
//! address = 0x48
//! kind = "ads1115"
//! voltages = [1.2, 0.0, 3.3, 0.0]
//! ```

use pihub_common::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which backend opens the bus and pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// In-memory board.
    #[default]
    Simulation,
    /// Raspberry Pi via rppal (requires the `rpi` feature).
    Rpi,
}

/// Kind of a simulated bus device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimDeviceKind {
    /// ADS1115 four-channel ADC.
    Ads1115,
    /// Plain 256-byte register file.
    Registers,
}

/// One device on the simulated bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimDeviceConfig {
    /// Bus address.
    pub address: u16,
    /// Device model.
    pub kind: SimDeviceKind,
    /// Initial input voltages (ADS1115 only).
    #[serde(default)]
    pub voltages: Option<[f64; 4]>,
}

/// Simulated board contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Devices attached to the simulated bus.
    #[serde(default)]
    pub devices: Vec<SimDeviceConfig>,
}

fn default_i2c_bus() -> u8 {
    1
}

/// `[hardware]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Backend selection.
    #[serde(default)]
    pub platform: PlatformKind,

    /// Index of the default I2C bus (`/dev/i2c-N`).
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    /// Simulated board contents, ignored on real hardware.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            platform: PlatformKind::default(),
            i2c_bus: default_i2c_bus(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl HardwareConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for out-of-range or duplicate
    /// simulated device addresses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for device in &self.simulation.devices {
            if device.address > 0x3FF {
                return Err(ConfigError::ValidationError(format!(
                    "simulated device address {:#x} exceeds 10 bits",
                    device.address
                )));
            }
            if !seen.insert(device.address) {
                return Err(ConfigError::ValidationError(format!(
                    "two simulated devices at address {:#04x}",
                    device.address
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: HardwareConfig = toml::from_str("").unwrap();
        assert_eq!(config, HardwareConfig::default());
        assert_eq!(config.platform, PlatformKind::Simulation);
        assert_eq!(config.i2c_bus, 1);
        assert!(config.simulation.devices.is_empty());
    }

    #[test]
    fn test_simulated_devices() {
        let config: HardwareConfig = toml::from_str(
            r#"
platform = "simulation"

[[simulation.devices]]
address = 0x48
kind = "ads1115"
voltages = [1.0, 2.0, 3.0, 4.0]

[[simulation.devices]]
address = 0x20
kind = "registers"
"#,
        )
        .unwrap();

        assert_eq!(config.simulation.devices.len(), 2);
        assert_eq!(config.simulation.devices[0].kind, SimDeviceKind::Ads1115);
        assert_eq!(config.simulation.devices[0].voltages, Some([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(config.simulation.devices[1].voltages, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let config: HardwareConfig = toml::from_str(
            r#"
[[simulation.devices]]
address = 0x20
kind = "registers"

[[simulation.devices]]
address = 0x20
kind = "ads1115"
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let result: Result<HardwareConfig, _> = toml::from_str(r#"platform = "beaglebone""#);
        assert!(result.is_err());
    }
}

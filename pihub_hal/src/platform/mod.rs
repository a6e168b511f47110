//! Hardware platforms.
//!
//! A platform is the backend the `ResourceProvider` opens the bus and pins
//! through. The simulation platform is always built; the Raspberry Pi
//! backend needs the `rpi` feature.

#[cfg(feature = "rpi")]
pub mod rpi;
pub mod simulation;

use crate::config::{HardwareConfig, PlatformKind, SimDeviceKind};
use pihub_common::error::HardwareError;
use pihub_common::resources::Platform;
use simulation::{RegisterDevice, SimAds1115, SimulatedPlatform};
use tracing::info;

/// Build the platform selected by `config`.
///
/// # Errors
/// `HardwareError::Platform` when the Raspberry Pi backend is requested but
/// not compiled in, or cannot open the GPIO device.
pub fn create_platform(config: &HardwareConfig) -> Result<Box<dyn Platform>, HardwareError> {
    match config.platform {
        PlatformKind::Simulation => Ok(Box::new(simulated_from_config(config))),
        #[cfg(feature = "rpi")]
        PlatformKind::Rpi => Ok(Box::new(rpi::RpiPlatform::new(config.i2c_bus)?)),
        #[cfg(not(feature = "rpi"))]
        PlatformKind::Rpi => Err(HardwareError::Platform(
            "built without the `rpi` feature".to_string(),
        )),
    }
}

/// Simulated board populated with the devices listed in `config`.
pub fn simulated_from_config(config: &HardwareConfig) -> SimulatedPlatform {
    let platform = SimulatedPlatform::new();
    for device in &config.simulation.devices {
        match device.kind {
            SimDeviceKind::Ads1115 => {
                let ads = SimAds1115::with_voltages(device.voltages.unwrap_or_default());
                platform.add_device(device.address, ads);
            }
            SimDeviceKind::Registers => platform.add_device(device.address, RegisterDevice::new()),
        }
    }
    info!(
        "Simulated platform with {} bus devices",
        config.simulation.devices.len()
    );
    platform
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimDeviceConfig;

    #[test]
    fn test_simulation_from_config() {
        let mut config = HardwareConfig::default();
        config.simulation.devices.push(SimDeviceConfig {
            address: 0x20,
            kind: SimDeviceKind::Registers,
            voltages: None,
        });

        let platform = create_platform(&config).unwrap();
        assert_eq!(platform.name(), "simulation");
        let mut bus = platform.open_bus().unwrap();
        let mut buf = [0xFFu8; 1];
        bus.transact(0x20, &[0x00], &mut buf).unwrap();
        assert_eq!(buf, [0]);
        assert!(bus.transact(0x21, &[0x00], &mut buf).is_err());
    }

    #[cfg(not(feature = "rpi"))]
    #[test]
    fn test_rpi_requires_feature() {
        let config = HardwareConfig {
            platform: PlatformKind::Rpi,
            ..HardwareConfig::default()
        };
        assert!(matches!(
            create_platform(&config).err(),
            Some(HardwareError::Platform(_))
        ));
    }
}

//! ADS1115 analog-to-digital converter.
//!
//! Config: `{"channel": 0..=3, "address": 0x48, "max_voltage": 5.0, "data_rate": 128}`
//! (`channel_mask` is accepted as an alias of `channel`).
//!
//! Action `read` returns the single-ended voltage on the channel as a number.
//!
//! Each sample is a single-shot conversion: write the config register with
//! the OS bit set, wait one conversion period, poll OS until the device
//! reports idle, then read the conversion register. The whole sequence runs
//! under one bus lock so that another module cannot reconfigure the ADC
//! between the config write and the conversion read.

use pihub_common::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POINTER_CONVERSION: u8 = 0x00;
const POINTER_CONFIG: u8 = 0x01;

const CONFIG_OS_SINGLE: u16 = 0x8000;
const CONFIG_MUX_SINGLE_ENDED: u16 = 0b100;
const CONFIG_MODE_SINGLE_SHOT: u16 = 0x0100;
const CONFIG_COMP_DISABLE: u16 = 0x0003;

/// Full-scale range per PGA setting, in volts.
const FULL_SCALE: [f64; 6] = [6.144, 4.096, 2.048, 1.024, 0.512, 0.256];

/// Supported data rates in samples per second, indexed by their DR bits.
const DATA_RATES: [u16; 8] = [8, 16, 32, 64, 128, 250, 475, 860];

/// Default bus address (ADDR pin tied to ground).
pub const DEFAULT_ADDRESS: u16 = 0x48;

/// Pick the most sensitive PGA setting that still covers `max_voltage`.
fn gain_for(max_voltage: f64) -> Option<usize> {
    if max_voltage.is_nan() || max_voltage <= 0.0 {
        return None;
    }
    (0..FULL_SCALE.len())
        .rev()
        .find(|&index| FULL_SCALE[index] >= max_voltage)
}

fn rate_index(data_rate: u16) -> Option<usize> {
    DATA_RATES.iter().position(|&rate| rate == data_rate)
}

/// Shared checks for every configuration that samples an ADS1115.
pub(crate) fn validate_adc(channel: u8, max_voltage: f64, data_rate: u16) -> Result<(), String> {
    if channel > 3 {
        return Err(format!("channel {channel} out of range 0..=3"));
    }
    if gain_for(max_voltage).is_none() {
        return Err(format!(
            "max_voltage {max_voltage} must be in (0, {}]",
            FULL_SCALE[0]
        ));
    }
    if rate_index(data_rate).is_none() {
        return Err(format!(
            "data_rate {data_rate} not one of {DATA_RATES:?}"
        ));
    }
    Ok(())
}

/// One single-ended input of an ADS1115.
#[derive(Clone)]
pub struct AdsChannel {
    device: I2cDevice,
    channel: u8,
    gain: usize,
    rate: usize,
}

impl AdsChannel {
    /// Bind `channel` of the converter behind `device`.
    ///
    /// Inputs must already have passed `validate_adc`.
    pub fn new(device: I2cDevice, channel: u8, max_voltage: f64, data_rate: u16) -> Result<Self, ModuleError> {
        validate_adc(channel, max_voltage, data_rate).map_err(ModuleError::Validation)?;
        Ok(Self {
            device,
            channel,
            gain: gain_for(max_voltage).unwrap_or(0),
            rate: rate_index(data_rate).unwrap_or(4),
        })
    }

    /// Read the config register once to make sure the converter answers.
    pub fn probe(&self) -> Result<(), HardwareError> {
        let mut config = [0u8; 2];
        self.device.tx(&[POINTER_CONFIG], &mut config)
    }

    fn config_word(&self) -> u16 {
        CONFIG_OS_SINGLE
            | ((CONFIG_MUX_SINGLE_ENDED | self.channel as u16) << 12)
            | ((self.gain as u16) << 9)
            | CONFIG_MODE_SINGLE_SHOT
            | ((self.rate as u16) << 5)
            | CONFIG_COMP_DISABLE
    }

    fn conversion_time(&self) -> Duration {
        Duration::from_micros(1_000_000 / DATA_RATES[self.rate] as u64 + 100)
    }

    /// Take one single-shot sample and return it in volts.
    pub fn read_voltage(&self) -> Result<f64, HardwareError> {
        let address = self.device.address();
        let [hi, lo] = self.config_word().to_be_bytes();
        let wait = self.conversion_time();

        let mut bus = self.device.bus().lock()?;
        bus.transact(address, &[POINTER_CONFIG, hi, lo], &mut [])?;
        thread::sleep(wait);

        let deadline = Instant::now() + wait * 4;
        let mut status = [0u8; 2];
        loop {
            bus.transact(address, &[POINTER_CONFIG], &mut status)?;
            if u16::from_be_bytes(status) & CONFIG_OS_SINGLE != 0 {
                break;
            }
            if Instant::now() > deadline {
                return Err(HardwareError::Timeout(format!(
                    "ADS1115 at {address:#04x} conversion did not complete"
                )));
            }
            thread::sleep(Duration::from_micros(200));
        }

        let mut raw = [0u8; 2];
        bus.transact(address, &[POINTER_CONVERSION], &mut raw)?;
        drop(bus);

        let raw = i16::from_be_bytes(raw);
        let volts = raw as f64 * FULL_SCALE[self.gain] / 32768.0;
        debug!("ADS1115 {:#04x} ch{}: raw={} -> {:.4} V", address, self.channel, raw, volts);
        Ok(volts)
    }
}

/// ADS1115 module configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsConfig {
    /// Single-ended input, 0..=3.
    #[serde(alias = "channel_mask", skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    /// Bus address.
    pub address: u16,
    /// Highest voltage expected on the input; selects the PGA range.
    pub max_voltage: f64,
    /// Samples per second.
    pub data_rate: u16,
}

impl Bindable for AdsConfig {
    fn defaults() -> Option<Self> {
        Some(Self {
            channel: None,
            address: DEFAULT_ADDRESS,
            max_voltage: 5.0,
            data_rate: 128,
        })
    }

    fn validate(&self) -> Result<(), String> {
        let channel = self.channel.ok_or("channel is required")?;
        validate_adc(channel, self.max_voltage, self.data_rate)
    }
}

/// Single-channel voltage reader.
#[derive(Default)]
pub struct AdsModule {
    input: Option<AdsChannel>,
}

/// Registry factory.
pub fn create_module() -> Box<dyn Module> {
    Box::new(AdsModule::default())
}

impl Module for AdsModule {
    fn kind(&self) -> &'static str {
        "ads"
    }

    fn initialize(
        &mut self,
        resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError> {
        let config: AdsConfig = config.bind()?;
        let device = I2cDevice::new(resources.default_bus()?, config.address);
        let input = AdsChannel::new(
            device,
            config.channel.unwrap_or_default(),
            config.max_voltage,
            config.data_rate,
        )?;
        input.probe()?;
        self.input = Some(input);
        Ok(())
    }

    fn act(&mut self, action: &str, _request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        match action {
            "read" => {
                let input = self
                    .input
                    .as_ref()
                    .ok_or_else(|| ModuleError::not_initialized("read"))?;
                to_result(input.read_voltage()?)
            }
            _ => Err(ModuleError::unknown_action(action)),
        }
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        self.input = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulation::{SimAds1115, SimulatedPlatform};
    use serde_json::json;

    fn setup(config: Value) -> (SimAds1115, ResourceProvider, Result<AdsModule, ModuleError>) {
        let ads = SimAds1115::with_voltages([0.5, 1.25, 3.3, 4.9]);
        let platform = SimulatedPlatform::new().with_device(DEFAULT_ADDRESS, ads.clone());
        let resources = ResourceProvider::new(Box::new(platform));
        let mut module = AdsModule::default();
        let result = module
            .initialize(&resources, &ConfigBinder::new(&RawConfig::new(config)))
            .map(|()| module);
        (ads, resources, result)
    }

    fn read(module: &mut AdsModule) -> f64 {
        module
            .act("read", &ConfigBinder::new(&RawConfig::default()))
            .unwrap()
            .as_f64()
            .unwrap()
    }

    #[test]
    fn test_gain_selection() {
        assert_eq!(gain_for(5.0), Some(0));
        assert_eq!(gain_for(4.096), Some(1));
        assert_eq!(gain_for(3.3), Some(1));
        assert_eq!(gain_for(0.1), Some(5));
        assert_eq!(gain_for(6.5), None);
        assert_eq!(gain_for(0.0), None);
    }

    #[test]
    fn test_read_channel() {
        let (ads, _resources, module) = setup(json!({ "channel": 2, "data_rate": 860 }));
        let mut module = module.unwrap();
        assert!((read(&mut module) - 3.3).abs() < 0.001);

        ads.set_voltage(2, 1.0);
        assert!((read(&mut module) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_channel_mask_alias_and_small_range() {
        let (_ads, _resources, module) =
            setup(json!({ "channel_mask": 0, "max_voltage": 1.0, "data_rate": 860 }));
        let mut module = module.unwrap();
        assert!((read(&mut module) - 0.5).abs() < 0.0001);
    }

    #[test]
    fn test_config_validation() {
        let (_, _, result) = setup(json!({}));
        assert!(matches!(result.err(), Some(ModuleError::Validation(_))));

        let (_, _, result) = setup(json!({ "channel": 4 }));
        assert!(matches!(result.err(), Some(ModuleError::Validation(_))));

        let (_, _, result) = setup(json!({ "channel": 0, "data_rate": 100 }));
        assert!(matches!(result.err(), Some(ModuleError::Validation(_))));
    }

    #[test]
    fn test_missing_converter_fails_initialize() {
        let (_, _, result) = setup(json!({ "channel": 0, "address": 0x49 }));
        assert_eq!(
            result.err(),
            Some(ModuleError::Hardware(HardwareError::Nack { address: 0x49 }))
        );
    }
}

//! HTG3535CH humidity + NTC temperature probe, read through an ADS1115.
//!
//! Config:
//! ```json
//! {"temperature_adc_channel": 0, "humidity_adc_channel": 1,
//!  "rh_calibration_adjustment": 0.0, "address": 72,
//!  "vcc_volts": 5.0, "batch_resistance_ohms": 10000.0}
//! ```
//!
//! Actions: `rh` (percent, calibrated), `tk`, `tc`, `tf`, and
//! `calibrate {"true_value": 100.0}` or `calibrate {"adjustment": -2.5}`,
//! which replaces the humidity offset and returns `{"adjustment": ...}`.
//!
//! The NTC sits in a divider with `batch_resistance_ohms` against `vcc_volts`;
//! resistance is converted with the Steinhart-Hart coefficients from the
//! probe datasheet.

use super::ads1115::{AdsChannel, DEFAULT_ADDRESS, validate_adc};
use pihub_common::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

const STEINHART_A: f64 = 8.61393e-04;
const STEINHART_B: f64 = 2.56377e-04;
const STEINHART_C: f64 = 1.68055e-07;

const KELVIN_OFFSET: f64 = 273.15;

/// Probe configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtgConfig {
    /// ADC input wired to the NTC divider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_adc_channel: Option<u8>,
    /// ADC input wired to the humidity output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity_adc_channel: Option<u8>,
    /// Offset added to every humidity reading, in percent.
    pub rh_calibration_adjustment: f64,
    /// ADS1115 bus address.
    pub address: u16,
    /// Supply voltage of the probe.
    pub vcc_volts: f64,
    /// Fixed resistor of the NTC divider.
    pub batch_resistance_ohms: f64,
    /// ADS1115 samples per second.
    pub data_rate: u16,
}

impl Bindable for HtgConfig {
    fn defaults() -> Option<Self> {
        Some(Self {
            temperature_adc_channel: None,
            humidity_adc_channel: None,
            rh_calibration_adjustment: 0.0,
            address: DEFAULT_ADDRESS,
            vcc_volts: 5.0,
            batch_resistance_ohms: 10_000.0,
            data_rate: 128,
        })
    }

    fn validate(&self) -> Result<(), String> {
        let temperature = self
            .temperature_adc_channel
            .ok_or("temperature_adc_channel is required")?;
        let humidity = self
            .humidity_adc_channel
            .ok_or("humidity_adc_channel is required")?;
        if temperature == humidity {
            return Err("temperature and humidity must use different channels".to_string());
        }
        if self.batch_resistance_ohms <= 0.0 {
            return Err("batch_resistance_ohms must be positive".to_string());
        }
        validate_adc(temperature, self.vcc_volts, self.data_rate)?;
        validate_adc(humidity, self.vcc_volts, self.data_rate)
    }
}

/// Payload of the `calibrate` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrateRequest {
    /// Humidity the probe should currently report.
    #[serde(default)]
    pub true_value: Option<f64>,
    /// Explicit offset; wins over `true_value`.
    #[serde(default)]
    pub adjustment: Option<f64>,
}

impl Bindable for CalibrateRequest {}

#[derive(Serialize)]
struct CalibrateResponse {
    adjustment: f64,
}

/// Relative humidity from the probe's output voltage.
pub fn humidity_from_volts(v: f64) -> f64 {
    -1.564 * v * v * v + 12.05 * v * v + 8.22 * v - 15.6
}

/// Temperature in Kelvin from the divider voltage.
pub fn kelvin_from_volts(v: f64, vcc: f64, batch_resistance_ohms: f64) -> Result<f64, HardwareError> {
    if v <= 0.0 || v >= vcc {
        return Err(HardwareError::InvalidReading(format!(
            "NTC divider at {v:.4} V outside (0, {vcc}) V"
        )));
    }
    let ntc_ohms = batch_resistance_ohms * v / (vcc - v);
    let ln_r = ntc_ohms.ln();
    Ok(1.0 / (STEINHART_A + STEINHART_B * ln_r + STEINHART_C * ln_r * ln_r * ln_r))
}

struct Probe {
    temperature: AdsChannel,
    humidity: AdsChannel,
    vcc_volts: f64,
    batch_resistance_ohms: f64,
}

impl Probe {
    fn raw_humidity(&self) -> Result<f64, HardwareError> {
        Ok(humidity_from_volts(self.humidity.read_voltage()?))
    }

    fn kelvin(&self) -> Result<f64, HardwareError> {
        let v = self.temperature.read_voltage()?;
        kelvin_from_volts(v, self.vcc_volts, self.batch_resistance_ohms)
    }
}

/// HTG3535CH driver. The calibration offset lives in the instance.
#[derive(Default)]
pub struct HtgModule {
    probe: Option<Probe>,
    rh_adjustment: f64,
}

/// Registry factory.
pub fn create_module() -> Box<dyn Module> {
    Box::new(HtgModule::default())
}

impl HtgModule {
    fn probe(&self) -> Result<&Probe, ModuleError> {
        self.probe
            .as_ref()
            .ok_or_else(|| ModuleError::not_initialized("act"))
    }
}

impl Module for HtgModule {
    fn kind(&self) -> &'static str {
        "htg3535ch"
    }

    fn initialize(
        &mut self,
        resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError> {
        let config: HtgConfig = config.bind()?;
        let device = I2cDevice::new(resources.default_bus()?, config.address);
        let temperature = AdsChannel::new(
            device.clone(),
            config.temperature_adc_channel.unwrap_or_default(),
            config.vcc_volts,
            config.data_rate,
        )?;
        let humidity = AdsChannel::new(
            device,
            config.humidity_adc_channel.unwrap_or_default(),
            config.vcc_volts,
            config.data_rate,
        )?;
        temperature.probe()?;

        self.probe = Some(Probe {
            temperature,
            humidity,
            vcc_volts: config.vcc_volts,
            batch_resistance_ohms: config.batch_resistance_ohms,
        });
        self.rh_adjustment = config.rh_calibration_adjustment;
        Ok(())
    }

    fn act(&mut self, action: &str, request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        match action {
            "rh" => to_result(self.probe()?.raw_humidity()? + self.rh_adjustment),
            "tk" => to_result(self.probe()?.kelvin()?),
            "tc" => to_result(self.probe()?.kelvin()? - KELVIN_OFFSET),
            "tf" => to_result((self.probe()?.kelvin()? - KELVIN_OFFSET) * 9.0 / 5.0 + 32.0),
            "calibrate" => {
                let probe = self.probe()?;
                let request: CalibrateRequest = request.bind()?;
                let adjustment = match request.adjustment {
                    Some(adjustment) => adjustment,
                    None => request.true_value.unwrap_or(100.0) - probe.raw_humidity()?,
                };
                self.rh_adjustment = adjustment;
                info!("Humidity calibration adjustment set to {:.3}", adjustment);
                to_result(CalibrateResponse { adjustment })
            }
            _ => Err(ModuleError::unknown_action(action)),
        }
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        self.probe = None;
        Ok(())
    }
}

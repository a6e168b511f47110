//! Raw I2C module.
//!
//! Config: `{"address": 32}`. Action `transact` takes
//! `{"bytes": [u8...], "resp_len": n}`, performs one write-then-read
//! transaction on the default bus and returns `{"response": [u8...]}`.

use pihub_common::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest 10-bit address.
const MAX_ADDRESS: u16 = 0x3FF;

/// Upper bound on a single read, well beyond any register block.
const MAX_RESPONSE_LEN: usize = 4096;

/// I2C module configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct I2cConfig {
    /// 7- or 10-bit device address.
    pub address: u16,
}

impl Bindable for I2cConfig {
    fn validate(&self) -> Result<(), String> {
        if self.address > MAX_ADDRESS {
            return Err(format!("address {:#x} exceeds 10 bits", self.address));
        }
        Ok(())
    }
}

/// Payload of the `transact` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactRequest {
    /// Bytes to write, may be empty.
    #[serde(default)]
    pub bytes: Vec<u8>,
    /// Number of bytes to read back.
    #[serde(default)]
    pub resp_len: usize,
}

impl Bindable for TransactRequest {
    fn validate(&self) -> Result<(), String> {
        if self.resp_len > MAX_RESPONSE_LEN {
            return Err(format!(
                "resp_len {} exceeds {MAX_RESPONSE_LEN}",
                self.resp_len
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct TransactResponse {
    response: Vec<u8>,
}

/// Raw bus access to one device.
#[derive(Default)]
pub struct I2cModule {
    device: Option<I2cDevice>,
}

/// Registry factory.
pub fn create_module() -> Box<dyn Module> {
    Box::new(I2cModule::default())
}

impl Module for I2cModule {
    fn kind(&self) -> &'static str {
        "i2c"
    }

    fn initialize(
        &mut self,
        resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError> {
        let config: I2cConfig = config.bind()?;
        let bus = resources.default_bus()?;
        self.device = Some(I2cDevice::new(bus, config.address));
        Ok(())
    }

    fn act(&mut self, action: &str, request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        match action {
            "transact" => {
                let device = self
                    .device
                    .as_ref()
                    .ok_or_else(|| ModuleError::not_initialized("transact"))?;
                let request: TransactRequest = request.bind()?;
                let mut response = vec![0u8; request.resp_len];
                device.tx(&request.bytes, &mut response)?;
                to_result(TransactResponse { response })
            }
            _ => Err(ModuleError::unknown_action(action)),
        }
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        self.device = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::simulation::{RegisterDevice, SimulatedPlatform};
    use serde_json::json;

    fn setup(address: u16) -> (SimulatedPlatform, RegisterDevice, ResourceProvider, I2cModule) {
        let registers = RegisterDevice::new();
        let platform = SimulatedPlatform::new().with_device(0x20, registers.clone());
        let resources = ResourceProvider::new(Box::new(platform.clone()));
        let mut module = I2cModule::default();
        module
            .initialize(
                &resources,
                &ConfigBinder::new(&RawConfig::new(json!({ "address": address }))),
            )
            .unwrap();
        (platform, registers, resources, module)
    }

    #[test]
    fn test_transact_write_then_read() {
        let (platform, registers, _resources, mut module) = setup(0x20);
        let write = RawConfig::new(json!({ "bytes": [0x04, 0xDE, 0xAD] }));
        assert_eq!(
            module.act("transact", &ConfigBinder::new(&write)).unwrap(),
            json!({ "response": [] })
        );
        assert_eq!(registers.register(0x05), 0xAD);

        let read = RawConfig::new(json!({ "bytes": [0x04], "resp_len": 2 }));
        assert_eq!(
            module.act("transact", &ConfigBinder::new(&read)).unwrap(),
            json!({ "response": [0xDE, 0xAD] })
        );
        assert_eq!(platform.transactions(), 2);
    }

    #[test]
    fn test_absent_device_is_hardware_error() {
        let (_platform, _registers, _resources, mut module) = setup(0x21);
        let request = RawConfig::new(json!({ "bytes": [0x00], "resp_len": 1 }));
        let err = module.act("transact", &ConfigBinder::new(&request)).unwrap_err();
        assert_eq!(err, ModuleError::Hardware(HardwareError::Nack { address: 0x21 }));
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_address_must_fit_ten_bits() {
        let resources = ResourceProvider::new(Box::new(SimulatedPlatform::new()));
        let mut module = I2cModule::default();
        let err = module
            .initialize(
                &resources,
                &ConfigBinder::new(&RawConfig::new(json!({ "address": 0x400 }))),
            )
            .unwrap_err();
        assert!(matches!(err, ModuleError::Validation(_)));
    }

    #[test]
    fn test_unknown_action_does_not_touch_bus() {
        let (platform, _registers, _resources, mut module) = setup(0x20);
        let request = RawConfig::new(json!({ "bytes": [0x00] }));
        assert!(matches!(
            module.act("scan", &ConfigBinder::new(&request)),
            Err(ModuleError::UnknownAction { .. })
        ));
        assert_eq!(platform.transactions(), 0);
    }
}

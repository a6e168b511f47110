//! Relay module: one digital output pin.
//!
//! Config: `{"pin": "20", "inverted": false, "initial": "low"}`
//!
//! Actions:
//! - `set` with `{"state": "high"|"low"}` or `{"high": true|false}`
//! - `get` returns the last commanded logical state
//!
//! With `inverted` the physical level is the logical state XOR'd with one,
//! for boards whose relay coil is driven active-low.

use pihub_common::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Pin name in the platform namespace.
    pub pin: Option<String>,
    /// Drive the opposite physical level.
    pub inverted: bool,
    /// Logical state applied during initialize.
    pub initial: Level,
}

impl Bindable for RelayConfig {
    fn defaults() -> Option<Self> {
        Some(Self {
            pin: None,
            inverted: false,
            initial: Level::Low,
        })
    }

    fn validate(&self) -> Result<(), String> {
        match self.pin.as_deref() {
            Some(pin) if !pin.trim().is_empty() => Ok(()),
            _ => Err("pin is required".to_string()),
        }
    }
}

/// Payload of the `set` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
    /// Target level by name.
    #[serde(default)]
    pub state: Option<Level>,
    /// Target level as a boolean.
    #[serde(default)]
    pub high: Option<bool>,
}

impl SetRequest {
    fn level(&self) -> Level {
        match (self.state, self.high) {
            (Some(level), _) => level,
            (None, Some(high)) => Level::from(high),
            (None, None) => Level::Low,
        }
    }
}

impl Bindable for SetRequest {
    fn validate(&self) -> Result<(), String> {
        match (self.state, self.high) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (None, None) => Err("one of `state` or `high` is required".to_string()),
            (Some(_), Some(_)) => Err("`state` and `high` are mutually exclusive".to_string()),
        }
    }
}

/// Relay driver.
#[derive(Default)]
pub struct RelayModule {
    pin: Option<Arc<SharedPin>>,
    inverted: bool,
    state: Level,
}

/// Registry factory.
pub fn create_module() -> Box<dyn Module> {
    Box::new(RelayModule::default())
}

impl RelayModule {
    fn drive(&mut self, logical: Level) -> Result<(), ModuleError> {
        let pin = self.pin.as_ref().ok_or_else(|| ModuleError::not_initialized("set"))?;
        let physical = if self.inverted { !logical } else { logical };
        pin.set_output(physical)?;
        debug!("Relay on {} -> {} (pin {})", pin.name(), logical, physical);
        self.state = logical;
        Ok(())
    }
}

impl Module for RelayModule {
    fn kind(&self) -> &'static str {
        "relay"
    }

    fn initialize(
        &mut self,
        resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError> {
        let config: RelayConfig = config.bind()?;
        let name = config.pin.unwrap_or_default();
        self.pin = Some(resources.pin_by_name(&name)?);
        self.inverted = config.inverted;
        self.drive(config.initial)
    }

    fn act(&mut self, action: &str, request: &ConfigBinder<'_>) -> Result<Value, ModuleError> {
        match action {
            "set" => {
                let request: SetRequest = request.bind()?;
                self.drive(request.level())?;
                Ok(json!({ "state": self.state }))
            }
            "get" => {
                if self.pin.is_none() {
                    return Err(ModuleError::not_initialized("get"));
                }
                Ok(json!({ "state": self.state }))
            }
            _ => Err(ModuleError::unknown_action(action)),
        }
    }

    fn stop(&mut self) -> Result<(), ModuleError> {
        self.pin = None;
        Ok(())
    }
}

//! Module contract.
//!
//! This module defines:
//! - `Module` trait - Interface every driver kind implements
//! - `ModuleFactory` type alias - Constructor stored in the registry
//! - `ModuleSpec` - One entry of an initialize request
//! - `ModuleState` - Per-instance lifecycle state

use crate::binder::{ConfigBinder, RawConfig};
use crate::error::ModuleError;
use crate::resources::ResourceProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Trait implemented by every driver kind.
///
/// The module manager drives instances through this trait; drivers never
/// see each other or the module table.
///
/// # Lifecycle
///
/// ```text
/// Uninitialized --initialize()--> Ready --stop()--> Stopped
///                                   |
///                                 act() (any number of times)
/// ```
///
/// The manager enforces the state machine and serializes calls on one
/// instance, so implementations may take `&mut self` without extra locking.
pub trait Module: Send {
    /// Registry key of this driver kind (e.g. "relay").
    fn kind(&self) -> &'static str;

    /// Acquire resources and bind the module's configuration.
    ///
    /// Called exactly once per instance.
    ///
    /// # Errors
    /// - `Decode`/`Validation` when the configuration is rejected
    /// - `Hardware` when a resource cannot be acquired or probed
    fn initialize(
        &mut self,
        resources: &ResourceProvider,
        config: &ConfigBinder<'_>,
    ) -> Result<(), ModuleError>;

    /// Perform the named action.
    ///
    /// Unrecognized actions fail with `UnknownAction` before any hardware is
    /// touched. The result is serialized back to the client as-is.
    fn act(&mut self, action: &str, request: &ConfigBinder<'_>) -> Result<Value, ModuleError>;

    /// Release everything acquired in `initialize`.
    ///
    /// After this returns the instance holds no resource handles.
    fn stop(&mut self) -> Result<(), ModuleError>;
}

/// Constructor producing a fresh, uninitialized driver instance.
pub type ModuleFactory = fn() -> Box<dyn Module>;

/// One requested module: a unique name bound to a driver kind and its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Client-chosen module name, unique within one request.
    pub name: String,
    /// Driver kind (registry key).
    pub source: String,
    /// Driver-defined configuration, passed through unmodified.
    #[serde(default)]
    pub config: RawConfig,
}

impl ModuleSpec {
    /// Build a spec.
    pub fn new(name: impl Into<String>, source: impl Into<String>, config: impl Into<RawConfig>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            config: config.into(),
        }
    }
}

/// Lifecycle state of one module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// Constructed, `initialize` not yet successful.
    Uninitialized,
    /// Accepting actions.
    Ready,
    /// Resources released.
    Stopped,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Uninitialized => f.write_str("uninitialized"),
            ModuleState::Ready => f.write_str("ready"),
            ModuleState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Serialize a driver result into the opaque response value.
pub fn to_result<T: Serialize>(value: T) -> Result<Value, ModuleError> {
    serde_json::to_value(value).map_err(|e| ModuleError::Driver(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_config_defaults_to_absent() {
        let spec: ModuleSpec = serde_json::from_value(json!({
            "name": "fan",
            "source": "relay"
        }))
        .unwrap();
        assert!(spec.config.is_absent());
    }

    #[test]
    fn test_spec_config_passes_through() {
        let spec = ModuleSpec::new("fan", "relay", json!({ "pin": "20", "extra": [1, 2] }));
        assert_eq!(spec.config.as_value(), &json!({ "pin": "20", "extra": [1, 2] }));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ModuleState::Ready.to_string(), "ready");
        assert_eq!(ModuleState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_to_result() {
        assert_eq!(to_result(1.5).unwrap(), json!(1.5));
        assert_eq!(to_result(()).unwrap(), Value::Null);
    }

    #[test]
    fn test_unserializable_result_is_driver_fault() {
        let mut by_pair = std::collections::HashMap::new();
        by_pair.insert((1u8, 2u8), 3u8);

        let err = to_result(by_pair).unwrap_err();
        assert!(matches!(err, ModuleError::Driver(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }
}

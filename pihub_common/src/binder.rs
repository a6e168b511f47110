//! Configuration binding.
//!
//! A [`RawConfig`] is the opaque payload a client attaches to an initialize
//! spec or an act request. The core never looks inside it; each driver asks
//! a [`ConfigBinder`] to materialize it into its own typed configuration.
//!
//! Binding runs in three phases:
//! 1. baseline values from [`Bindable::defaults`] (if the type provides them)
//! 2. decode the payload on top, overwriting only the fields it carries
//! 3. [`Bindable::validate`] on the fully populated value
//!
//! Phase 2 failures are [`ModuleError::Decode`], phase 3 failures are
//! [`ModuleError::Validation`]; both classify as input errors.

use crate::error::ModuleError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque configuration payload, passed through the core unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConfig(Value);

impl RawConfig {
    /// Wrap an already-parsed JSON tree.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a payload from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModuleError> {
        serde_json::from_slice(bytes)
            .map(Self)
            .map_err(|e| ModuleError::Decode(e.to_string()))
    }

    /// The underlying JSON tree.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// True when the client sent no payload at all.
    pub fn is_absent(&self) -> bool {
        self.0.is_null()
    }
}

impl From<Value> for RawConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A configuration type the binder can materialize.
///
/// Both hooks are optional capabilities: types that have no baseline values
/// or no semantic checks simply keep the provided implementations.
pub trait Bindable: DeserializeOwned + Serialize {
    /// Baseline values applied before the payload is decoded.
    fn defaults() -> Option<Self> {
        None
    }

    /// Semantic checks on the fully populated value.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Bindable for Value {}

/// Decode-default-validate pipeline over one payload.
#[derive(Debug, Clone, Copy)]
pub struct ConfigBinder<'a> {
    payload: &'a RawConfig,
}

impl<'a> ConfigBinder<'a> {
    /// Create a binder over `payload`.
    pub fn new(payload: &'a RawConfig) -> Self {
        Self { payload }
    }

    /// The payload this binder reads from.
    pub fn payload(&self) -> &'a RawConfig {
        self.payload
    }

    /// Bind the payload into a fresh `T`.
    ///
    /// An absent payload binds like an empty object, so a type whose fields
    /// all have defaults binds to exactly those defaults.
    pub fn bind<T: Bindable>(&self) -> Result<T, ModuleError> {
        let incoming = match self.payload.as_value() {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };

        let tree = match T::defaults() {
            Some(baseline) => {
                let mut tree = serde_json::to_value(baseline)
                    .map_err(|e| ModuleError::Decode(e.to_string()))?;
                overlay(&mut tree, incoming);
                tree
            }
            None => incoming,
        };

        let value: T =
            serde_json::from_value(tree).map_err(|e| ModuleError::Decode(e.to_string()))?;
        value.validate().map_err(ModuleError::Validation)?;
        Ok(value)
    }
}

/// Write `incoming` over `base`; objects merge key by key, anything else replaces.
fn overlay(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, incoming) => *base = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sensor {
        pin: String,
        interval_ms: u64,
        limits: Limits,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Limits {
        low: f64,
        high: f64,
    }

    impl Bindable for Sensor {
        fn defaults() -> Option<Self> {
            Some(Self {
                pin: String::new(),
                interval_ms: 100,
                limits: Limits { low: 0.0, high: 100.0 },
            })
        }

        fn validate(&self) -> Result<(), String> {
            if self.pin.is_empty() {
                return Err("pin is required".to_string());
            }
            Ok(())
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Plain {
        address: u16,
    }

    impl Bindable for Plain {}

    fn bind<T: Bindable>(value: Value) -> Result<T, ModuleError> {
        let raw = RawConfig::new(value);
        ConfigBinder::new(&raw).bind()
    }

    #[test]
    fn test_omitted_field_keeps_default() {
        let sensor: Sensor = bind(json!({ "pin": "4" })).unwrap();
        assert_eq!(sensor.interval_ms, 100);
        assert_eq!(sensor.pin, "4");
    }

    #[test]
    fn test_present_field_overrides_default() {
        let sensor: Sensor = bind(json!({ "pin": "4", "interval_ms": 5 })).unwrap();
        assert_eq!(sensor.interval_ms, 5);
    }

    #[test]
    fn test_nested_fields_merge() {
        let sensor: Sensor = bind(json!({ "pin": "4", "limits": { "high": 42.0 } })).unwrap();
        assert_eq!(sensor.limits, Limits { low: 0.0, high: 42.0 });
    }

    #[test]
    fn test_type_mismatch_is_decode_error() {
        let err = bind::<Sensor>(json!({ "pin": "4", "interval_ms": "fast" })).unwrap_err();
        assert!(matches!(err, ModuleError::Decode(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_failed_check_is_validation_error() {
        let err = bind::<Sensor>(json!({ "interval_ms": 5 })).unwrap_err();
        assert_eq!(err, ModuleError::Validation("pin is required".to_string()));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_without_defaults_missing_field_fails() {
        let err = bind::<Plain>(json!({})).unwrap_err();
        assert!(matches!(err, ModuleError::Decode(_)));

        let plain: Plain = bind(json!({ "address": 72 })).unwrap();
        assert_eq!(plain.address, 72);
    }

    #[test]
    fn test_absent_payload_binds_defaults() {
        let raw = RawConfig::default();
        assert!(raw.is_absent());
        let err = ConfigBinder::new(&raw).bind::<Sensor>().unwrap_err();
        // Defaults alone leave `pin` empty, which validation rejects.
        assert!(matches!(err, ModuleError::Validation(_)));

        let value: Value = ConfigBinder::new(&raw).bind().unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_from_slice_rejects_garbage() {
        assert!(RawConfig::from_slice(br#"{"pin": "20"}"#).is_ok());
        let err = RawConfig::from_slice(b"{pin").unwrap_err();
        assert!(matches!(err, ModuleError::Decode(_)));
    }
}

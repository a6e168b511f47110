//! Prelude module for common re-exports.
//!
//! Drivers usually need everything here:
//!
//! ```rust
//! use pihub_common::prelude::*;
//! ```

// ─── Module contract ────────────────────────────────────────────────
pub use crate::module::{Module, ModuleFactory, ModuleSpec, ModuleState, to_result};

// ─── Configuration binding ──────────────────────────────────────────
pub use crate::binder::{Bindable, ConfigBinder, RawConfig};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{ErrorKind, HardwareError, ModuleError};

// ─── Resources ──────────────────────────────────────────────────────
pub use crate::gpio::{Level, wait_for_level};
pub use crate::resources::{
    BusGuard, GpioPin, I2cBus, I2cDevice, PinGuard, Platform, ResourceProvider, SharedBus,
    SharedPin,
};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

//! # pihub HAL Library
//!
//! Module runtime with pluggable driver modules.
//!
//! Drivers implement the `Module` trait defined in `pihub_common::module` and
//! are looked up by name in a [`ModuleRegistry`]. The [`ModuleManager`] owns
//! the live table of named instances and routes actions to them.
//!
//! # Module Structure
//!
//! - [`manager`] - Live module table, batch initialization, action routing
//! - [`module_registry`] - Driver factory registration
//! - [`drivers`] - Built-in driver modules
//! - [`platform`] - Hardware backends (simulation, Raspberry Pi)
//! - [`config`] - `[hardware]` configuration section
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         pihub_hal                                │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐    │
//! │  │  transport   │───►│ ModuleManager│───►│  ModuleRegistry  │    │
//! │  │ (pihub_api)  │    │ (live table) │    │                  │    │
//! │  └──────────────┘    └──────┬───────┘    └──────────────────┘    │
//! │                             │                                    │
//! │                             ▼                                    │
//! │                    ┌────────────────┐     ┌──────────────────┐   │
//! │                    │  Module        │────►│ ResourceProvider │   │
//! │                    │  (trait obj)   │     │ bus + pins       │   │
//! │                    └────────────────┘     └────────┬─────────┘   │
//! │                                                    ▼             │
//! │                                           ┌──────────────────┐   │
//! │                                           │ Platform         │   │
//! │                                           └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod drivers;
pub mod manager;
pub mod module_registry;
pub mod platform;

// Re-export key types for convenience
pub use crate::config::{HardwareConfig, PlatformKind};
pub use crate::manager::{ModuleInfo, ModuleManager};
pub use crate::module_registry::ModuleRegistry;
pub use crate::platform::create_platform;
pub use crate::platform::simulation::SimulatedPlatform;

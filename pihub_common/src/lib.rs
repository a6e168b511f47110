//! pihub Common Library
//!
//! Shared contract between the module runtime, the drivers and the
//! transport layer.
//!
//! # Module Structure
//!
//! - [`module`] - `Module` trait, `ModuleSpec`, lifecycle state
//! - [`binder`] - Decode-default-validate configuration binding
//! - [`resources`] - `ResourceProvider` and the platform/bus/pin seams
//! - [`gpio`] - Logic levels and edge-wait helper
//! - [`error`] - Error taxonomy and classification
//! - [`config`] - TOML configuration loading
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use pihub_common::prelude::*;
//! ```

#![warn(missing_docs)]

pub mod binder;
pub mod config;
pub mod error;
pub mod gpio;
pub mod module;
pub mod prelude;
pub mod resources;

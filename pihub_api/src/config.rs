//! Hub configuration file.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "greenhouse-hub"
//! log_level = "info"
//!
//! [server]
//! bind = "0.0.0.0:3141"
//! request_timeout_ms = 5000
//!
//! [hardware]
//! platform = "rpi"
//! i2c_bus = 1
//! ```
//!
//! Every section is optional; a missing file means all defaults.

use pihub_common::config::{ConfigError, SharedConfig};
use pihub_hal::HardwareConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

fn default_bind() -> String {
    "0.0.0.0:3141".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

/// `[server]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Per-request budget for initialize and act.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Service name and log level.
    #[serde(default)]
    pub shared: SharedConfig,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Platform selection and simulated board.
    #[serde(default)]
    pub hardware: HardwareConfig,
}

impl HubConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    /// - `request_timeout_ms` is zero
    /// - `bind` is not a socket address
    /// - the simulated board is inconsistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }

        self.server.bind.parse::<SocketAddr>().map_err(|e| {
            ConfigError::ValidationError(format!("invalid bind address '{}': {}", self.server.bind, e))
        })?;

        self.hardware.validate()
    }
}

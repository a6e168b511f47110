//! Hub configuration file.
//!
//! pihub reads a single TOML file at startup. Each section is a plain serde
//! struct with per-field defaults; [`ConfigLoader`] gives every such struct a
//! `load` and a `load_or_default`, the latter treating a missing file as
//! "all defaults" so a bare `pihub --simulate` works out of the box.
//!
//! Semantic checks stay with the section that owns the fields and report
//! [`ConfigError::ValidationError`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to produce a usable configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Nothing at the given path.
    #[error("no configuration file at {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file exists but could not be read (permissions, not a file, ...).
    #[error("cannot read {}: {message}", path.display())]
    Read {
        /// File that failed
        path: PathBuf,
        /// OS error text
        message: String,
    },

    /// The file is not valid TOML or does not match the expected tables.
    #[error("invalid configuration in {}: {message}", path.display())]
    ParseError {
        /// File that failed
        path: PathBuf,
        /// Parser error text, including line and column
        message: String,
    },

    /// Parsed, but a value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Verbosity of the hub's log output (`trace` .. `error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Every bus transaction and edge wait.
    Trace,
    /// Request bodies and per-action dispatch.
    Debug,
    /// Module lifecycle and server events.
    #[default]
    Info,
    /// Rejected requests and recoverable faults.
    Warn,
    /// Hardware failures only.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

fn default_service_name() -> String {
    "pihub".to_string()
}

/// `[shared]` table: identity and verbosity of the process.
///
/// ```toml
/// [shared]
/// service_name = "greenhouse-hub"
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Default log level; `RUST_LOG` and `--verbose` take precedence.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Reported by `GET /health`, defaults to `pihub`.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Reject a blank `service_name`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// TOML loading for any deserializable configuration struct.
pub trait ConfigLoader: Sized + DeserializeOwned {
    /// Read and parse `path`.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
            _ => ConfigError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Like [`ConfigLoader::load`], but a missing file yields `Self::default()`.
    ///
    /// The flag is `false` when the defaults were used.
    fn load_or_default(path: &Path) -> Result<(Self, bool), ConfigError>
    where
        Self: Default,
    {
        match Self::load(path) {
            Ok(config) => Ok((config, true)),
            Err(ConfigError::FileNotFound(_)) => Ok((Self::default(), false)),
            Err(e) => Err(e),
        }
    }
}

impl<T: DeserializeOwned> ConfigLoader for T {}

//! Error taxonomy for the module runtime.
//!
//! Two layers:
//! - [`HardwareError`] - bus/pin level failures raised by platforms and drivers
//! - [`ModuleError`] - everything a module operation can fail with
//!
//! Every [`ModuleError`] classifies itself through [`ModuleError::kind`] so the
//! transport can pick a response status without inspecting variants.

use thiserror::Error;

/// Failures raised while talking to physical resources.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HardwareError {
    /// The platform has no usable I2C bus.
    #[error("I2C bus unavailable: {0}")]
    BusUnavailable(String),

    /// No device acknowledged the given address.
    #[error("I2C device at address {address:#04x} did not acknowledge")]
    Nack {
        /// 7/10-bit device address
        address: u16,
    },

    /// Any other bus transaction failure.
    #[error("I2C transaction failed: {0}")]
    Bus(String),

    /// Pin name not present in the platform's pin namespace.
    #[error("Pin not found: {0}")]
    PinNotFound(String),

    /// A signal edge or conversion did not arrive in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The device answered but the reading failed a sanity check.
    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    /// The resource provider has been closed.
    #[error("Resource provider is closed")]
    Closed,

    /// Platform-specific failure (driver library, permissions, ...).
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Coarse classification used to map errors onto response statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or invalid client data.
    Input,
    /// The request references a source, module or action that does not exist.
    NotFound,
    /// Hardware failures and driver faults.
    Internal,
}

/// Errors returned by module operations and the module manager.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    /// Initialize spec references an unregistered driver kind.
    #[error("no such module source: {0}")]
    UnknownSource(String),

    /// Configuration payload could not be decoded into the expected shape.
    #[error("failed decoding configuration: {0}")]
    Decode(String),

    /// Configuration decoded but failed semantic checks.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// Act request references a module that is not live.
    #[error("no such module: {0}")]
    UnknownModule(String),

    /// The target module does not implement the named action.
    #[error("no such action `{action}`{}", on_module(.module))]
    UnknownAction {
        /// Target module, filled in by the manager
        module: Option<String>,
        /// Requested action name
        action: String,
    },

    /// Underlying I/O failure.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Operation invoked in a lifecycle state that does not allow it.
    #[error("cannot {operation} a module in state {state}")]
    InvalidState {
        /// Current lifecycle state
        state: String,
        /// Attempted operation
        operation: &'static str,
    },

    /// A driver produced something it cannot hand back (e.g. an
    /// unserializable result).
    #[error("driver fault: {0}")]
    Driver(String),

    /// A spec of an initialize batch failed; the batch was aborted.
    #[error("failed to initialize module `{module}`: {source}")]
    Initialize {
        /// Name of the spec that failed
        module: String,
        /// Underlying failure
        source: Box<ModuleError>,
    },
}

fn on_module(module: &Option<String>) -> String {
    module
        .as_deref()
        .map(|name| format!(" on module `{name}`"))
        .unwrap_or_default()
}

impl ModuleError {
    /// Shorthand for [`ModuleError::UnknownAction`], as raised by a driver.
    pub fn unknown_action(action: &str) -> Self {
        Self::UnknownAction {
            module: None,
            action: action.to_string(),
        }
    }

    /// Attach the module name to an `UnknownAction` that lacks one.
    pub fn for_module(self, name: &str) -> Self {
        match self {
            Self::UnknownAction {
                module: None,
                action,
            } => Self::UnknownAction {
                module: Some(name.to_string()),
                action,
            },
            other => other,
        }
    }

    /// Error for a driver used before `initialize` succeeded.
    pub fn not_initialized(operation: &'static str) -> Self {
        Self::InvalidState {
            state: "uninitialized".to_string(),
            operation,
        }
    }

    /// The innermost error, looking through batch wrappers.
    pub fn root_cause(&self) -> &ModuleError {
        match self {
            Self::Initialize { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Classify the error for the transport layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::Validation(_) => ErrorKind::Input,
            Self::UnknownSource(_) | Self::UnknownModule(_) | Self::UnknownAction { .. } => {
                ErrorKind::NotFound
            }
            Self::Hardware(_) | Self::InvalidState { .. } | Self::Driver(_) => ErrorKind::Internal,
            Self::Initialize { source, .. } => source.kind(),
        }
    }

    /// True for client-caused failures (bad payloads and unknown references).
    pub fn is_input_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Input | ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(ModuleError::Decode("x".into()).kind(), ErrorKind::Input);
        assert_eq!(ModuleError::Validation("x".into()).kind(), ErrorKind::Input);
        assert_eq!(ModuleError::UnknownSource("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ModuleError::UnknownModule("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ModuleError::unknown_action("x").kind(), ErrorKind::NotFound);
        assert_eq!(
            ModuleError::from(HardwareError::Nack { address: 0x48 }).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_initialize_delegates_kind() {
        let err = ModuleError::Initialize {
            module: "fan".into(),
            source: Box::new(ModuleError::Validation("pin is required".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(err.is_input_error());
        assert!(err.to_string().contains("fan"));
        assert!(err.to_string().contains("pin is required"));

        let err = ModuleError::Initialize {
            module: "adc".into(),
            source: Box::new(HardwareError::Closed.into()),
        };
        assert!(!err.is_input_error());
        assert_eq!(err.root_cause(), &ModuleError::Hardware(HardwareError::Closed));
    }

    #[test]
    fn test_unknown_action_names_module_once_attached() {
        let raw = ModuleError::unknown_action("explode");
        assert_eq!(raw.to_string(), "no such action `explode`");

        let err = raw.for_module("fan");
        assert_eq!(err.to_string(), "no such action `explode` on module `fan`");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Already attached names and other errors pass through.
        assert_eq!(err.clone().for_module("other"), err);
        let hw = ModuleError::from(HardwareError::Closed);
        assert_eq!(hw.clone().for_module("fan"), hw);
    }

    #[test]
    fn test_driver_fault_is_internal_not_hardware() {
        let err = ModuleError::Driver("key must be a string".into());
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.is_input_error());
        assert!(!matches!(err.root_cause(), ModuleError::Hardware(_)));
    }

    #[test]
    fn test_hardware_error_display() {
        let err = HardwareError::Nack { address: 0x48 };
        assert!(err.to_string().contains("0x48"));

        let err = HardwareError::PinNotFound("GPIO99".into());
        assert!(err.to_string().contains("GPIO99"));
    }
}

//! Shared handler state.

use pihub_hal::ModuleManager;
use std::sync::Arc;
use std::time::Duration;

/// Cloned into every handler by axum.
#[derive(Clone)]
pub struct AppState {
    /// The module runtime.
    pub manager: Arc<ModuleManager>,
    /// Budget for one initialize or act request.
    pub request_timeout: Duration,
    /// Reported by `/health`.
    pub service_name: Arc<str>,
}

impl AppState {
    /// Bundle the runtime with the server settings.
    pub fn new(manager: Arc<ModuleManager>, request_timeout: Duration, service_name: &str) -> Self {
        Self {
            manager,
            request_timeout,
            service_name: Arc::from(service_name),
        }
    }
}

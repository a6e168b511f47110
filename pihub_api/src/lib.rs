//! # pihub API
//!
//! HTTP liaison in front of the module runtime.
//!
//! # Endpoints
//!
//! | Method | Path          | Purpose                                  |
//! |--------|---------------|------------------------------------------|
//! | POST   | `/initialize` | Replace the live module table            |
//! | POST   | `/act`        | Invoke one action on one named module    |
//! | GET    | `/modules`    | List live modules                        |
//! | GET    | `/health`     | Service name, platform and module count  |
//!
//! See [`protocol`] for the bodies and [`error`] for the failure mapping.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod router;
pub mod state;

pub use crate::config::{HubConfig, ServerConfig};
pub use crate::error::ApiError;
pub use crate::router::router;
pub use crate::state::AppState;

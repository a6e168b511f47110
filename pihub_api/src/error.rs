//! Error to response mapping.
//!
//! | Failure                                   | Status | `kind`      |
//! |-------------------------------------------|--------|-------------|
//! | malformed body, `Decode`, `Validation`    | 400    | `input`     |
//! | `UnknownSource/Module/Action`             | 404    | `not_found` |
//! | `Hardware`, `Driver`, `InvalidState`      | 500    | `internal`  |
//! | request timeout                           | 504    | `timeout`   |

use crate::protocol::ErrorResponse;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pihub_common::error::{ErrorKind, ModuleError};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The body is not valid JSON or lacks required envelope fields.
    #[error("malformed request: {0}")]
    BadRequest(String),

    /// The module runtime rejected the request.
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// The request did not finish within the configured timeout.
    #[error("request did not complete within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The blocking worker panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

impl ApiError {
    /// Response status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Module(err) => match err.kind() {
                ErrorKind::Input => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classification string carried in the body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "input",
            ApiError::Module(err) => match err.kind() {
                ErrorKind::Input => "input",
                ErrorKind::NotFound => "not_found",
                ErrorKind::Internal => "internal",
            },
            ApiError::Timeout(_) => "timeout",
            ApiError::Worker(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }

        let body = ErrorResponse {
            message: self.to_string(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

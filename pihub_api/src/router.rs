//! HTTP routes.
//!
//! Module operations block on hardware, so each request runs on tokio's
//! blocking pool under the configured timeout. A timed-out request answers
//! 504 while the hardware call keeps running to completion; partial
//! bit-banged sequences are never cut short.

use crate::error::ApiError;
use crate::protocol::{
    ActRequest, ActResponse, HealthResponse, InitializeRequest, InitializeResponse,
    ModulesResponse,
};
use crate::state::AppState;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use pihub_common::error::ModuleError;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/initialize", post(initialize))
        .route("/act", post(act))
        .route("/modules", get(modules))
        .route("/health", get(health))
        .with_state(state)
}

/// `POST /initialize`: replace the live table.
pub async fn initialize(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<InitializeResponse>, ApiError> {
    let request: InitializeRequest = parse(&body)?;
    debug!("initialize: {:?}", request);

    let specs = request.into_specs();
    let manager = Arc::clone(&state.manager);
    let num_modules =
        run_blocking(state.request_timeout, move || manager.initialize_modules(specs)).await?;

    info!("Initialized {} modules", num_modules);
    Ok(Json(InitializeResponse { num_modules }))
}

/// `POST /act`: invoke one action on one module.
pub async fn act(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ActResponse>, ApiError> {
    let request: ActRequest = parse(&body)?;
    debug!("act: {}.{}", request.module, request.action);

    let manager = Arc::clone(&state.manager);
    let result = run_blocking(state.request_timeout, move || {
        manager.act(&request.module, &request.action, &request.config)
    })
    .await?;

    Ok(Json(ActResponse { result }))
}

/// `GET /modules`: the live table.
pub async fn modules(State(state): State<AppState>) -> Json<ModulesResponse> {
    Json(ModulesResponse {
        modules: state.manager.modules(),
    })
}

/// `GET /health`: liveness plus a little context.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        service: state.service_name.to_string(),
        platform: state.manager.resources().platform_name().to_string(),
        num_modules: state.manager.len(),
    })
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn run_blocking<T, F>(timeout: Duration, work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ModuleError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result.map_err(ApiError::from),
        Ok(Err(join)) => Err(ApiError::Worker(join.to_string())),
        Err(_) => Err(ApiError::Timeout(timeout)),
    }
}

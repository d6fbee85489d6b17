//! Gateway endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::config::store::ConfigStatus;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::routing::registry::{LoadResult, ReloadError};
use crate::status::{GatewayInfo, HealthReport, ServiceListing, StatusSnapshot};

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub message: String,
    pub service: String,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfigReloadResponse {
    pub message: &'static str,
    pub config_status: ConfigStatus,
}

pub async fn root(State(state): State<AppState>) -> Json<GatewayInfo> {
    Json(state.status.gateway_info())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.status.health())
}

pub async fn gateway_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.status.snapshot())
}

pub async fn list_services(State(state): State<AppState>) -> Json<ServiceListing> {
    Json(state.status.service_listing())
}

/// `POST /gateway/reload/{service}`
pub async fn reload_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<ReloadResponse>, ApiError> {
    match state.registry.reload(&service).await? {
        LoadResult::Loaded(routes) => Ok(Json(ReloadResponse {
            message: format!("Service {service} reloaded successfully"),
            endpoints: routes.paths().into_iter().map(str::to_string).collect(),
            service,
        })),
        LoadResult::Failed(failure) => Err(ApiError::internal(format!(
            "Failed to reload service {service}: {failure}"
        ))),
    }
}

/// `POST /gateway/config/reload`
///
/// Mounts are declared once at startup; a reload only changes what modules
/// see on their next load and the gateway settings read per request.
pub async fn reload_config(State(state): State<AppState>) -> Result<Json<ConfigReloadResponse>, ApiError> {
    if !state.registry.reload_policy().is_allowed() {
        return Err(ReloadError::Forbidden.into());
    }
    state.config.reload()?;
    Ok(Json(ConfigReloadResponse {
        message: "Configuration reloaded",
        config_status: state.config.status(),
    }))
}

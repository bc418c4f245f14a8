pub mod form;
pub mod payment_methods;
pub mod payments;
pub mod webhook;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::CallContext;
use crate::error::AppError;
use crate::AppState;

pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Call context for a request: tenant from the header, else the configured default.
pub fn call_context(state: &AppState, headers: &HeaderMap) -> Result<CallContext, AppError> {
    let tenant = match headers.get(TENANT_HEADER) {
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| AppError::BadRequest(format!("{} is not valid text", TENANT_HEADER)))?;
            Uuid::parse_str(raw.trim())
                .map_err(|_| AppError::BadRequest(format!("{} must be a UUID", TENANT_HEADER)))?
        }
        None => state
            .default_tenant_id
            .ok_or_else(|| AppError::BadRequest(format!("missing {} header", TENANT_HEADER)))?,
    };
    Ok(CallContext::new(tenant))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub db: String,
    pub gateway_configured: bool,
    pub circuit_breaker: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match &state.db {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => "connected",
            Err(_) => "disconnected",
        },
        None => "in_memory",
    };
    let gateway_configured = state.gateway_config.is_complete();
    let healthy = db_status != "disconnected" && gateway_configured;

    let health_response = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        db: db_status.to_string(),
        gateway_configured,
        circuit_breaker: state.orchestrator.gateway().circuit_state(),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}

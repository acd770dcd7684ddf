//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (upstream gateway connected, if any)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::gateway::ConnectionState;
use crate::server::state::AppState;

/// Full health status body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    /// Upstream gateway state, absent when no bridge is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<ConnectionState>,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Returns 200 when there is no upstream gateway or it is connected.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.gateway_state() {
        None | Some(ConnectionState::Connected) => StatusCode::OK,
        Some(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /health
///
/// Full health status with component details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let gateway = state.gateway_state();
    let status = match gateway {
        None | Some(ConnectionState::Connected) => "healthy",
        Some(_) => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        connections: state.hub.connection_count().await,
        gateway,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }
}

//! Connection Routes
//!
//! - GET /api/v1/connections - Snapshot of hub connections

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::server::state::AppState;
use crate::websocket::ConnectionInfo;

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub count: usize,
    pub connections: Vec<ConnectionInfo>,
}

/// GET /api/v1/connections
pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<ConnectionsResponse> {
    let connections = state.hub.connections().await;
    Json(ConnectionsResponse {
        count: connections.len(),
        connections,
    })
}

//! Application State
//!
//! Shared state accessible by all HTTP and WebSocket handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::gateway::ConnectionState;
use crate::websocket::{ConnectionHub, HubConfig};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// WebSocket connection hub for real-time streaming
    pub hub: Arc<ConnectionHub>,
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Upstream gateway state, when a bridge is running
    pub gateway_state: Option<watch::Receiver<ConnectionState>>,
}

impl AppState {
    /// Create a new AppState with its own hub
    pub fn new(config: ServerConfig, hub_config: HubConfig) -> Self {
        Self::with_hub(config, Arc::new(ConnectionHub::new(hub_config)))
    }

    /// Create AppState around an existing hub
    pub fn with_hub(config: ServerConfig, hub: Arc<ConnectionHub>) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            start_time: Instant::now(),
            gateway_state: None,
        }
    }

    /// Report upstream gateway state on the health endpoint
    pub fn with_gateway_state(mut self, state: watch::Receiver<ConnectionState>) -> Self {
        self.gateway_state = Some(state);
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Current upstream gateway state, if a gateway is attached
    pub fn gateway_state(&self) -> Option<ConnectionState> {
        self.gateway_state.as_ref().map(|rx| *rx.borrow())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Path the hub accepts WebSocket upgrades on
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            ws_path: "/ws".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr() {
        assert_eq!(ServerConfig::new("127.0.0.1", 9000).addr(), "127.0.0.1:9000");
        assert_eq!(ServerConfig::default().ws_path, "/ws");
    }

    #[test]
    fn test_gateway_state_reported() {
        let state = AppState::new(ServerConfig::default(), HubConfig::default());
        assert!(state.gateway_state().is_none());

        let (_tx, rx) = watch::channel(ConnectionState::Connecting);
        let state = state.with_gateway_state(rx);
        assert_eq!(state.gateway_state(), Some(ConnectionState::Connecting));
    }
}

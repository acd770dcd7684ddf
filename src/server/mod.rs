//! Hub HTTP Server
//!
//! Mounts the connection hub and its health endpoints on an Axum router.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /ws` - Hub connection (path configurable)
//!
//! ## Connections
//! - `GET /api/v1/connections` - Snapshot of registered connections
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use gatelink::server::{serve, AppState, ServerConfig};
//! use gatelink::websocket::HubConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let state = AppState::new(config.clone(), HubConfig::default());
//!     serve(state, &config).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use state::{AppState, ServerConfig};

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let ws_path = state.config.ws_path.clone();

    let api_routes = Router::new().route("/connections", get(routes::connections::list_connections));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .route(&ws_path, get(websocket_handler))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Bind the listening socket. This is the only fatal startup failure.
pub async fn bind(config: &ServerConfig) -> ServerResult<TcpListener> {
    let addr = config.addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// Starts the hub heartbeat, and shuts the hub down (closing every
/// connection with code 1000) when the shutdown future completes.
pub async fn run<F>(state: AppState, listener: TcpListener, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = Arc::clone(&state.hub);
    hub.start_heartbeat().await;

    let ws_path = state.config.ws_path.clone();
    let router = build_router(state);
    let addr = listener.local_addr()?;

    tracing::info!(addr = %addr, ws_path = %ws_path, "Connection hub listening");

    let hub_for_shutdown = Arc::clone(&hub);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        hub_for_shutdown.shutdown().await;
    })
    .await?;

    // Covers the case where the server loop ended on its own
    hub.shutdown().await;

    tracing::info!("Connection hub shut down gracefully");
    Ok(())
}

/// Bind and serve until Ctrl+C or SIGTERM
pub async fn serve(state: AppState, config: &ServerConfig) -> ServerResult<()> {
    let listener = bind(config).await?;
    run(state, listener, shutdown_signal()).await
}

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ConnectionState;
    use crate::websocket::HubConfig;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tokio::sync::watch;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        build_router(AppState::new(ServerConfig::default(), HubConfig::default()))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        assert_eq!(get_status(create_test_app(), "/health/live").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_without_gateway() {
        assert_eq!(get_status(create_test_app(), "/health/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_with_disconnected_gateway() {
        let (_tx, rx) = watch::channel(ConnectionState::Disconnected);
        let state = AppState::new(ServerConfig::default(), HubConfig::default())
            .with_gateway_state(rx);

        assert_eq!(
            get_status(build_router(state), "/health/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_health_full() {
        let body = get_json(create_test_app(), "/health").await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
        assert!(body.get("gateway").is_none());
    }

    #[tokio::test]
    async fn test_list_connections_empty() {
        let body = get_json(create_test_app(), "/api/v1/connections").await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["connections"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_ws_path_requires_upgrade() {
        // A plain GET on the hub path is not a WebSocket handshake
        let status = get_status(create_test_app(), "/ws").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = bind(&ServerConfig::new("127.0.0.1", port)).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }
}

//! # gatelink
//!
//! Real-time gateway plumbing for an operations dashboard: keeps a dashboard
//! process and a remote agent process synchronized over a long-lived
//! WebSocket, and turns the agent's partial, possibly redelivered chat events
//! into a de-duplicated conversation.
//!
//! ## Modules
//!
//! - [`websocket`]: Connection hub serving dashboard clients
//! - [`gateway`]: Reconnecting client for the upstream gateway
//! - [`chat`]: Chat stream reducer
//! - [`protocol`]: Gateway wire frames and payloads
//! - [`server`]: Axum server hosting the hub
//! - [`bridge`]: Relays gateway events into the hub
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatelink::chat::ChatStreamReducer;
//! use gatelink::gateway::{GatewayClient, GatewayConfig, GatewayEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, mut events) =
//!         GatewayClient::with_channel(GatewayConfig::new("ws://127.0.0.1:18789"));
//!     client.start();
//!
//!     let mut reducer = ChatStreamReducer::default();
//!     while let Some(event) = events.recv().await {
//!         if let GatewayEvent::Chat(chat) = event {
//!             reducer.apply(chat);
//!             println!("{} turns", reducer.history().len());
//!         }
//!     }
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod chat;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod websocket;

// Re-export top-level types for convenience
pub use chat::{ActivityState, ChatMessage, ChatSnapshot, ChatStreamReducer, Outcome, ReducerConfig};

pub use gateway::{
    ConnectionState, GatewayClient, GatewayConfig, GatewayError, GatewayEvent, GatewayListener,
};

pub use protocol::{ChatEvent, ChatEventKind, EventFrame, Frame, ProtocolError};

pub use server::{build_router, serve, AppState, ServerConfig, ServerError};

pub use websocket::{ConnectionHub, HubConfig, HubError, HubEvent, websocket_handler};

pub use config::{Config, ConfigError, LoggingConfig};

pub use bridge::GatewayBridge;

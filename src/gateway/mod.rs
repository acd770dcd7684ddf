//! Gateway Client
//!
//! Keeps one logical connection to a remote gateway endpoint:
//!
//! - **Handshake**: waits briefly for a `connect.challenge`, then sends
//!   `connect` exactly once per physical connection
//! - **RPC**: request/response pairs multiplexed by id over the socket
//! - **Reconnect**: exponential backoff after any drop, until stopped
//! - **Events**: chat, presence and everything else routed to a
//!   [`GatewayListener`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatelink::gateway::{GatewayClient, GatewayConfig, GatewayEvent};
//!
//! let (client, mut events) = GatewayClient::with_channel(
//!     GatewayConfig::new("ws://127.0.0.1:18789").with_token("secret"),
//! );
//! client.start();
//!
//! while let Some(event) = events.recv().await {
//!     if let GatewayEvent::Ready(_) = event {
//!         let sessions = client.sessions_list().await?;
//!         println!("{sessions}");
//!     }
//! }
//! ```

mod backoff;
mod client;
mod error;
mod listener;
mod pending;
mod state;

pub use backoff::{Backoff, BackoffConfig};
pub use client::{GatewayClient, GatewayConfig};
pub use error::{GatewayError, GatewayResult};
pub use listener::{GatewayEvent, GatewayListener, NoopListener};
pub use state::ConnectionState;

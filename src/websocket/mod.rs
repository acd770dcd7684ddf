//! WebSocket Connection Hub
//!
//! Fans gateway events out to dashboard clients over WebSocket.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Registry of live connections, topic subscriptions and
//!   heartbeat eviction
//! - **Handler**: Handles WebSocket upgrade and message processing
//! - **Messages**: Defines client and server message formats
//!
//! ## Usage
//!
//! Clients connect to `/ws` and may subscribe to topics:
//! - `chat` - Chat stream snapshots and committed turns
//! - `presence` - Presence updates
//! - `gateway` - Gateway connection state
//! - `agent` - Any other gateway event
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8090/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', topic: 'chat'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   console.log('Received:', msg);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{
    ConnectionHub, ConnectionId, ConnectionInfo, HubConfig, HubError, PeerInfo, Registration,
    SweepReport, CLOSE_NORMAL,
};
pub use messages::{ClientMessage, HubEvent, Outbound, ServerMessage};

//! Gateway event observers

use serde_json::Value;
use tokio::sync::mpsc;

use super::state::ConnectionState;
use crate::protocol::{ChatEvent, EventFrame, HelloOk};

/// Receives everything the gateway connection reports.
///
/// Every method has a no-op default, so implementors override only what they
/// care about. Methods are called from the connection task and must not
/// block.
pub trait GatewayListener: Send + Sync + 'static {
    fn on_state_change(&self, _state: ConnectionState) {}

    /// Handshake acknowledged
    fn on_ready(&self, _hello: &HelloOk) {}

    /// A `chat` event, already normalized
    fn on_chat(&self, _event: ChatEvent) {}

    fn on_presence(&self, _payload: &Value) {}

    /// Any other event frame
    fn on_event(&self, _frame: &EventFrame) {}

    /// The transport closed, with the peer's close code if it sent one
    fn on_close(&self, _code: Option<u16>, _reason: &str) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl GatewayListener for NoopListener {}

/// Listener callbacks as values, for consumers that prefer a channel
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    State(ConnectionState),
    Ready(HelloOk),
    Chat(ChatEvent),
    Presence(Value),
    Event(EventFrame),
    Closed { code: Option<u16>, reason: String },
}

impl GatewayListener for mpsc::UnboundedSender<GatewayEvent> {
    fn on_state_change(&self, state: ConnectionState) {
        let _ = self.send(GatewayEvent::State(state));
    }

    fn on_ready(&self, hello: &HelloOk) {
        let _ = self.send(GatewayEvent::Ready(hello.clone()));
    }

    fn on_chat(&self, event: ChatEvent) {
        let _ = self.send(GatewayEvent::Chat(event));
    }

    fn on_presence(&self, payload: &Value) {
        let _ = self.send(GatewayEvent::Presence(payload.clone()));
    }

    fn on_event(&self, frame: &EventFrame) {
        let _ = self.send(GatewayEvent::Event(frame.clone()));
    }

    fn on_close(&self, code: Option<u16>, reason: &str) {
        let _ = self.send(GatewayEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }
}

//! WebSocket Message Types
//!
//! Defines all message types exchanged between dashboard clients and the
//! connection hub.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from client to hub
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving broadcasts for a topic
    Subscribe {
        /// Topic name (e.g., "chat", "presence")
        topic: String,
    },
    /// Stop receiving broadcasts for a topic
    Unsubscribe { topic: String },
    /// Application-level keepalive
    Ping,
}

/// Messages sent from hub to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Welcome message carrying the assigned identity
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
    /// Reply to an application ping
    Pong,
    /// Subscription confirmed
    Subscribed { topic: String },
    /// Unsubscription confirmed
    Unsubscribed { topic: String },
    /// Error scoped to this connection
    Error { message: String },
    /// Broadcast event
    Event {
        event: String,
        payload: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        seq: u64,
    },
}

/// Frames queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// JSON text message
    Message(ServerMessage),
    /// Heartbeat probe (WebSocket ping control frame)
    Ping,
    /// Close handshake, after which the writer stops
    Close { code: u16, reason: String },
}

/// An event published into the hub
#[derive(Debug, Clone)]
pub struct HubEvent {
    /// Event name
    pub event: String,
    /// Event payload
    pub payload: Value,
    /// Restrict delivery to subscribers of this topic; `None` reaches everyone
    pub topic: Option<String>,
}

impl HubEvent {
    /// Create an event delivered to every connection
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            topic: None,
        }
    }

    /// Restrict the event to a topic
    pub fn on_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub(crate) fn into_message(self, seq: u64) -> ServerMessage {
        ServerMessage::Event {
            event: self.event,
            payload: self.payload,
            topic: self.topic,
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_deserialize_subscribe() {
        let json = r#"{"type": "subscribe", "topic": "chat"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Subscribe { topic } => assert_eq!(topic, "chat"),
            _ => panic!("Expected Subscribe"),
        }
    }

    #[test]
    fn test_client_message_deserialize_ping() {
        let json = r#"{"type": "ping"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_client_message_unknown_type() {
        let json = r#"{"type": "dance"}"#;
        assert!(serde_json::from_str::<ClientMessage>(json).is_err());
    }

    #[test]
    fn test_server_message_serialize_connected() {
        let msg = ServerMessage::Connected {
            connection_id: "abc-123".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"connectionId\":\"abc-123\""));
    }

    #[test]
    fn test_hub_event_into_message() {
        let msg = HubEvent::new("chat", json!({"stream": "Hi"}))
            .on_topic("chat")
            .into_message(7);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"], "chat");
        assert_eq!(value["topic"], "chat");
        assert_eq!(value["seq"], 7);
        assert_eq!(value["payload"]["stream"], "Hi");
    }

    #[test]
    fn test_untopiced_event_omits_topic() {
        let value = serde_json::to_value(HubEvent::new("tick", json!(null)).into_message(1)).unwrap();
        assert!(value.get("topic").is_none());
    }
}

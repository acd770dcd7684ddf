//! Gateway Bridge
//!
//! Relays events from an upstream gateway into the connection hub so browser
//! dashboards see the agent's conversation without speaking the gateway
//! protocol themselves.
//!
//! | gateway event        | hub event                          | topic      |
//! |----------------------|------------------------------------|------------|
//! | state change         | `gateway.state`                    | `gateway`  |
//! | handshake complete   | `gateway.ready`                    | `gateway`  |
//! | transport closed     | `gateway.closed`                   | `gateway`  |
//! | chat                 | `chat` (snapshot + appended turns) | `chat`     |
//! | presence             | `presence`                         | `presence` |
//! | anything else        | same name                          | `agent`    |

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::chat::{ChatMessage, ChatStreamReducer, Outcome};
use crate::gateway::{GatewayClient, GatewayEvent, GatewayResult};
use crate::protocol::{ChatEvent, CHAT_EVENT, PRESENCE_EVENT};
use crate::websocket::{ConnectionHub, HubEvent};

pub const TOPIC_GATEWAY: &str = "gateway";
pub const TOPIC_CHAT: &str = "chat";
pub const TOPIC_PRESENCE: &str = "presence";
pub const TOPIC_AGENT: &str = "agent";

/// Folds gateway chat through a reducer and publishes the results
pub struct GatewayBridge {
    hub: Arc<ConnectionHub>,
    reducer: ChatStreamReducer,
    session_key: Option<String>,
}

impl GatewayBridge {
    pub fn new(hub: Arc<ConnectionHub>, reducer: ChatStreamReducer) -> Self {
        Self {
            hub,
            reducer,
            session_key: None,
        }
    }

    /// Drop chat events tagged with any other session
    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn reducer(&self) -> &ChatStreamReducer {
        &self.reducer
    }

    /// Process events until the gateway side hangs up
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<GatewayEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::debug!("Gateway bridge stopped");
    }

    /// Publish one gateway event. Returns how many hub connections it reached.
    pub async fn handle(&mut self, event: GatewayEvent) -> usize {
        let hub_event = match event {
            GatewayEvent::State(state) => HubEvent::new(
                "gateway.state",
                json!({ "state": state, "label": state.label() }),
            )
            .on_topic(TOPIC_GATEWAY),
            GatewayEvent::Ready(hello) => {
                HubEvent::new("gateway.ready", serde_json::to_value(&hello).unwrap_or(Value::Null))
                    .on_topic(TOPIC_GATEWAY)
            }
            GatewayEvent::Closed { code, reason } => {
                HubEvent::new("gateway.closed", json!({ "code": code, "reason": reason }))
                    .on_topic(TOPIC_GATEWAY)
            }
            GatewayEvent::Chat(chat) => match self.apply_chat(chat) {
                Some(payload) => HubEvent::new(CHAT_EVENT, payload).on_topic(TOPIC_CHAT),
                None => return 0,
            },
            GatewayEvent::Presence(payload) => {
                HubEvent::new(PRESENCE_EVENT, payload).on_topic(TOPIC_PRESENCE)
            }
            GatewayEvent::Event(frame) => HubEvent::new(frame.event, frame.payload).on_topic(TOPIC_AGENT),
        };

        self.hub.broadcast(hub_event).await
    }

    /// Run a chat event through the reducer, returning the payload to publish
    fn apply_chat(&mut self, chat: ChatEvent) -> Option<Value> {
        if let (Some(wanted), Some(actual)) = (&self.session_key, &chat.session_key) {
            if wanted != actual {
                tracing::trace!(session_key = %actual, "Chat event for another session");
                return None;
            }
        }

        let run_id = chat.run_id.clone();
        let outcome = self.reducer.apply(chat);
        if outcome == Outcome::Discarded {
            return None;
        }

        // One event appends at most one turn
        let appended: Vec<&ChatMessage> = match outcome {
            Outcome::Appended => self.reducer.last_turn().into_iter().collect(),
            _ => Vec::new(),
        };
        tracing::trace!(run_id = ?run_id, outcome = ?outcome, "Chat event applied");
        Some(json!({
            "outcome": outcome,
            "runId": run_id,
            "snapshot": self.reducer.snapshot(),
            "appended": appended,
        }))
    }
}

/// Send a chat message on behalf of the local user.
///
/// The message is recorded as a user turn first. If the gateway call fails,
/// a synthetic error turn is recorded as well and the error is returned.
pub async fn send_chat(
    client: &GatewayClient,
    reducer: &mut ChatStreamReducer,
    session_key: &str,
    message: &str,
) -> GatewayResult<Value> {
    reducer.push_user_message(message);
    match client.chat_send(session_key, message, None).await {
        Ok(response) => Ok(response),
        Err(e) => {
            tracing::warn!(session_key = %session_key, error = %e, "Chat send failed");
            reducer.record_send_failure(&e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ReducerConfig, Role};
    use crate::gateway::{ConnectionState, GatewayConfig, GatewayError, NoopListener};
    use crate::protocol::{ChatEventKind, EventFrame};
    use crate::websocket::{HubConfig, Outbound, PeerInfo, ServerMessage};

    async fn setup(topics: &[&str]) -> (GatewayBridge, mpsc::UnboundedReceiver<Outbound>) {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = hub.register(tx, PeerInfo::default()).await;
        let _ = rx.try_recv();
        for topic in topics {
            hub.subscribe(&registration.id, topic).await.unwrap();
        }
        (GatewayBridge::new(hub, ChatStreamReducer::default()), rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Option<(String, Value)> {
        match rx.try_recv() {
            Ok(Outbound::Message(ServerMessage::Event { event, payload, .. })) => {
                Some((event, payload))
            }
            _ => None,
        }
    }

    fn chat(run: &str, kind: ChatEventKind) -> GatewayEvent {
        GatewayEvent::Chat(ChatEvent::new(Some(run), kind))
    }

    #[tokio::test]
    async fn test_chat_run_published_once() {
        let (mut bridge, mut rx) = setup(&[TOPIC_CHAT]).await;

        bridge
            .handle(chat("r1", ChatEventKind::Delta { text: "Hel".into() }))
            .await;
        bridge
            .handle(chat("r1", ChatEventKind::Delta { text: "lo".into() }))
            .await;
        assert_eq!(
            bridge.handle(chat("r1", ChatEventKind::Final { text: None })).await,
            1
        );
        // Replayed final
        assert_eq!(
            bridge
                .handle(chat("r1", ChatEventKind::Final { text: Some("Hello".into()) }))
                .await,
            0
        );

        let (_, first) = next_event(&mut rx).unwrap();
        assert_eq!(first["snapshot"]["stream"], "Hel");
        let _ = next_event(&mut rx).unwrap();
        let (event, last) = next_event(&mut rx).unwrap();
        assert_eq!(event, "chat");
        assert_eq!(last["outcome"], "appended");
        assert_eq!(last["appended"][0]["text"], "Hello");
        assert!(next_event(&mut rx).is_none());

        assert_eq!(bridge.reducer().history().len(), 1);
    }

    #[tokio::test]
    async fn test_session_filter() {
        let (bridge, mut rx) = setup(&[TOPIC_CHAT]).await;
        let mut bridge = bridge.with_session_key("main");

        let other = ChatEvent::new(Some("r1"), ChatEventKind::Delta { text: "x".into() })
            .with_session("other");
        assert_eq!(bridge.handle(GatewayEvent::Chat(other)).await, 0);
        assert!(next_event(&mut rx).is_none());

        let mine = ChatEvent::new(Some("r2"), ChatEventKind::Delta { text: "y".into() })
            .with_session("main");
        assert_eq!(bridge.handle(GatewayEvent::Chat(mine)).await, 1);
    }

    #[tokio::test]
    async fn test_state_and_other_events_routed_by_topic() {
        let (mut bridge, mut rx) = setup(&[TOPIC_GATEWAY]).await;

        assert_eq!(
            bridge
                .handle(GatewayEvent::State(ConnectionState::Connected))
                .await,
            1
        );
        let (event, payload) = next_event(&mut rx).unwrap();
        assert_eq!(event, "gateway.state");
        assert_eq!(payload["state"], "connected");
        assert_eq!(payload["label"], "online");

        // Not subscribed to the agent topic
        let frame = EventFrame::new("agent.tick", json!({}));
        assert_eq!(bridge.handle(GatewayEvent::Event(frame)).await, 0);
    }

    #[tokio::test]
    async fn test_long_running_history_stays_bounded() {
        let hub = Arc::new(ConnectionHub::new(HubConfig::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = hub.register(tx, PeerInfo::default()).await;
        let _ = rx.try_recv();
        hub.subscribe(&registration.id, TOPIC_CHAT).await.unwrap();
        let mut bridge = GatewayBridge::new(
            hub,
            ChatStreamReducer::new(ReducerConfig {
                history_limit: 2,
                ..ReducerConfig::default()
            }),
        );

        for run in ["r1", "r2", "r3", "r4", "r5"] {
            bridge
                .handle(chat(run, ChatEventKind::Final { text: Some(run.to_string()) }))
                .await;
            let (_, payload) = next_event(&mut rx).unwrap();
            assert_eq!(payload["appended"][0]["text"], run);
            assert_eq!(payload["appended"].as_array().unwrap().len(), 1);
        }
        assert_eq!(bridge.reducer().history().len(), 2);
    }

    #[tokio::test]
    async fn test_send_chat_records_failure_turn() {
        let client = GatewayClient::new(GatewayConfig::default(), NoopListener);
        let mut reducer = ChatStreamReducer::default();

        let result = send_chat(&client, &mut reducer, "main", "hello").await;
        assert!(matches!(result, Err(GatewayError::NotConnected)));

        let history = reducer.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].text, "hello");
        assert!(history[1].is_error);
        assert_eq!(history[1].text, "Failed to send: gateway not connected");
    }
}

//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::hub::{ConnectionHub, PeerInfo, Registration};
use super::messages::{ClientMessage, Outbound, ServerMessage};
use crate::server::AppState;

/// WebSocket upgrade handler
///
/// This is the entry point for dashboard connections. It upgrades the HTTP
/// connection to WebSocket and starts message handling.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let peer = PeerInfo {
        remote_addr: connect_info.map(|ConnectInfo(addr)| addr),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub, peer))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<ConnectionHub>, peer: PeerInfo) {
    let (mut sender, mut receiver) = socket.split();

    // Channel feeding this connection's writer; the hub owns the sending side
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let Registration {
        id: connection_id,
        mut terminated,
    } = hub.register(tx, peer).await;

    let conn_id_for_send = connection_id.clone();

    // Task to forward queued frames to the WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let frame = match outbound {
                Outbound::Message(msg) => match serde_json::to_string(&msg) {
                    Ok(text) => Message::Text(text),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize message");
                        continue;
                    }
                },
                Outbound::Ping => Message::Ping(Vec::new()),
                Outbound::Close { code, reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };

            if sender.send(frame).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_for_send,
                    "WebSocket send failed, closing connection"
                );
                break;
            }
        }
    });

    let hub_for_recv = Arc::clone(&hub);
    let conn_id_for_recv = connection_id.clone();

    // Task to receive messages from WebSocket and handle them
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&hub_for_recv, &conn_id_for_recv, msg).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for either task to complete, or for the hub to evict us
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
        Ok(()) = &mut terminated => {
            tracing::debug!(connection_id = %connection_id, "Connection terminated by hub");
            send_task.abort();
            recv_task.abort();
        }
    }

    // Cleanup: unregister from hub
    hub.unregister(&connection_id).await;
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
pub(crate) async fn handle_ws_message(
    hub: &ConnectionHub,
    connection_id: &str,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            handle_text(hub, connection_id, &text).await;
            true
        }
        Message::Binary(_) => {
            let error_msg = ServerMessage::Error {
                message: "Binary messages not supported".to_string(),
            };
            let _ = hub.send_to(connection_id, error_msg).await;
            true
        }
        Message::Ping(_) => {
            // Axum answers pings automatically
            true
        }
        Message::Pong(_) => {
            hub.mark_alive(connection_id).await;
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}

/// Parse a text frame. Bad JSON is answered with an error; well-formed JSON
/// of an unknown kind is only logged.
async fn handle_text(hub: &ConnectionHub, connection_id: &str, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(
                connection_id = %connection_id,
                error = %e,
                "Invalid client message"
            );
            let error_msg = ServerMessage::Error {
                message: format!("Invalid message format: {}", e),
            };
            let _ = hub.send_to(connection_id, error_msg).await;
            return;
        }
    };

    match ClientMessage::deserialize(&value) {
        Ok(client_msg) => handle_client_message(hub, connection_id, client_msg).await,
        Err(e) => {
            tracing::warn!(
                connection_id = %connection_id,
                kind = ?value.get("type"),
                error = %e,
                "Unrecognized client message"
            );
        }
    }
}

/// Handle a parsed client message
async fn handle_client_message(hub: &ConnectionHub, connection_id: &str, message: ClientMessage) {
    let response = match message {
        ClientMessage::Subscribe { topic } => match hub.subscribe(connection_id, &topic).await {
            Ok(()) => ServerMessage::Subscribed { topic },
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "Subscribe rejected");
                ServerMessage::Error {
                    message: e.to_string(),
                }
            }
        },
        ClientMessage::Unsubscribe { topic } => {
            match hub.unsubscribe(connection_id, &topic).await {
                Ok(_) => ServerMessage::Unsubscribed { topic },
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Unsubscribe rejected");
                    ServerMessage::Error {
                        message: e.to_string(),
                    }
                }
            }
        }
        ClientMessage::Ping => {
            hub.mark_alive(connection_id).await;
            ServerMessage::Pong
        }
    };

    let _ = hub.send_to(connection_id, response).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::HubConfig;

    async fn setup() -> (ConnectionHub, String, mpsc::UnboundedReceiver<Outbound>) {
        let hub = ConnectionHub::new(HubConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = hub.register(tx, PeerInfo::default()).await;
        // Welcome
        let _ = rx.try_recv();
        (hub, registration.id, rx)
    }

    fn next_message(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Option<ServerMessage> {
        match rx.try_recv() {
            Ok(Outbound::Message(msg)) => Some(msg),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let (hub, id, mut rx) = setup().await;
        let keep = handle_ws_message(&hub, &id, Message::Text(r#"{"type":"ping"}"#.into())).await;

        assert!(keep);
        assert_eq!(next_message(&mut rx), Some(ServerMessage::Pong));
    }

    #[tokio::test]
    async fn test_subscribe_acknowledged() {
        let (hub, id, mut rx) = setup().await;
        handle_ws_message(
            &hub,
            &id,
            Message::Text(r#"{"type":"subscribe","topic":"chat"}"#.into()),
        )
        .await;

        assert_eq!(
            next_message(&mut rx),
            Some(ServerMessage::Subscribed {
                topic: "chat".to_string()
            })
        );
        assert_eq!(hub.subscription_count("chat").await, 1);

        handle_ws_message(
            &hub,
            &id,
            Message::Text(r#"{"type":"unsubscribe","topic":"chat"}"#.into()),
        )
        .await;
        assert_eq!(
            next_message(&mut rx),
            Some(ServerMessage::Unsubscribed {
                topic: "chat".to_string()
            })
        );
        assert_eq!(hub.subscription_count("chat").await, 0);
    }

    #[tokio::test]
    async fn test_invalid_topic_yields_error() {
        let (hub, id, mut rx) = setup().await;
        handle_ws_message(
            &hub,
            &id,
            Message::Text(r#"{"type":"subscribe","topic":"has space"}"#.into()),
        )
        .await;

        assert!(matches!(
            next_message(&mut rx),
            Some(ServerMessage::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_json_yields_error() {
        let (hub, id, mut rx) = setup().await;
        let keep = handle_ws_message(&hub, &id, Message::Text("{not json".into())).await;

        assert!(keep);
        match next_message(&mut rx) {
            Some(ServerMessage::Error { message }) => {
                assert!(message.starts_with("Invalid message format"))
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_is_ignored() {
        let (hub, id, mut rx) = setup().await;
        let keep = handle_ws_message(&hub, &id, Message::Text(r#"{"type":"dance"}"#.into())).await;

        assert!(keep);
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_binary_yields_error() {
        let (hub, id, mut rx) = setup().await;
        let keep = handle_ws_message(&hub, &id, Message::Binary(vec![1, 2, 3])).await;

        assert!(keep);
        assert!(matches!(
            next_message(&mut rx),
            Some(ServerMessage::Error { .. })
        ));
    }

    #[tokio::test]
    async fn test_pong_marks_alive() {
        let (hub, id, mut rx) = setup().await;
        hub.sweep().await;
        assert!(!hub.connections().await[0].alive);
        let _ = rx.try_recv();

        handle_ws_message(&hub, &id, Message::Pong(Vec::new())).await;
        assert!(hub.connections().await[0].alive);
    }

    #[tokio::test]
    async fn test_close_ends_connection() {
        let (hub, id, _rx) = setup().await;
        assert!(!handle_ws_message(&hub, &id, Message::Close(None)).await);
    }
}

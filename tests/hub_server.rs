//! Connection hub served over a real socket.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use gatelink::server::{self, AppState, ServerConfig};
use gatelink::websocket::{ConnectionHub, HubConfig, HubEvent};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    url: String,
    hub: Arc<ConnectionHub>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start(hub_config: HubConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let hub = Arc::new(ConnectionHub::new(hub_config));
        let state = AppState::with_hub(
            ServerConfig::new("127.0.0.1", addr.port()),
            Arc::clone(&hub),
        );

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server::run(state, listener, async {
                let _ = stopped.await;
            })
            .await
            .unwrap();
        });

        Self {
            url: format!("ws://{}/ws", addr),
            hub,
            stop: Some(stop),
            task,
        }
    }

    async fn connect(&self) -> (WsStream, String) {
        let (mut ws, _) = timeout(TIMEOUT, connect_async(self.url.as_str()))
            .await
            .unwrap()
            .unwrap();
        let welcome = recv_json(&mut ws).await;
        assert_eq!(welcome["type"], "connected");
        let id = welcome["connectionId"].as_str().unwrap().to_string();
        (ws, id)
    }

    async fn wait_for_connections(&self, count: usize) {
        timeout(TIMEOUT, async {
            while self.hub.connection_count().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection count never settled");
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        timeout(TIMEOUT, self.task).await.unwrap().unwrap();
    }
}

async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let message = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for hub message")
            .expect("stream ended")
            .expect("transport error");
        match message {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn subscribe(ws: &mut WsStream, topic: &str) {
    send_json(ws, json!({"type": "subscribe", "topic": topic})).await;
    let reply = recv_json(ws).await;
    assert_eq!(reply, json!({"type": "subscribed", "topic": topic}));
}

#[tokio::test]
async fn welcome_carries_registered_id() {
    let server = TestServer::start(HubConfig::default()).await;
    let (_ws, id) = server.connect().await;

    server.wait_for_connections(1).await;
    let connections = server.hub.connections().await;
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].id, id);

    server.shutdown().await;
}

#[tokio::test]
async fn ping_and_bad_input() {
    let server = TestServer::start(HubConfig::default()).await;
    let (mut ws, _) = server.connect().await;

    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await, json!({"type": "pong"}));

    ws.send(Message::Text("{not json".to_string())).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid message format"));

    send_json(&mut ws, json!({"type": "subscribe", "topic": ""})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "error");

    // Still usable afterwards
    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut ws).await, json!({"type": "pong"}));

    server.shutdown().await;
}

#[tokio::test]
async fn broadcasts_follow_subscriptions() {
    let server = TestServer::start(HubConfig::default()).await;
    let (mut chat_client, _) = server.connect().await;
    let (mut other_client, _) = server.connect().await;
    server.wait_for_connections(2).await;

    subscribe(&mut chat_client, "chat").await;
    subscribe(&mut other_client, "presence").await;

    let delivered = server
        .hub
        .broadcast(HubEvent::new("chat", json!({"text": "hi"})).on_topic("chat"))
        .await;
    assert_eq!(delivered, 1);

    let event = recv_json(&mut chat_client).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["event"], "chat");
    assert_eq!(event["topic"], "chat");
    assert_eq!(event["payload"]["text"], "hi");
    let first_seq = event["seq"].as_u64().unwrap();

    // Untopiced events reach everyone, with a larger sequence number
    let delivered = server
        .hub
        .broadcast(HubEvent::new("gateway.state", json!({"state": "connected"})))
        .await;
    assert_eq!(delivered, 2);

    let to_chat = recv_json(&mut chat_client).await;
    let to_other = recv_json(&mut other_client).await;
    assert_eq!(to_chat["event"], "gateway.state");
    assert!(to_chat.get("topic").is_none());
    assert_eq!(to_chat["seq"], to_other["seq"]);
    assert!(to_chat["seq"].as_u64().unwrap() > first_seq);

    send_json(&mut chat_client, json!({"type": "unsubscribe", "topic": "chat"})).await;
    assert_eq!(
        recv_json(&mut chat_client).await,
        json!({"type": "unsubscribed", "topic": "chat"})
    );
    let delivered = server
        .hub
        .broadcast(HubEvent::new("chat", json!({})).on_topic("chat"))
        .await;
    assert_eq!(delivered, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn client_disconnect_unregisters() {
    let server = TestServer::start(HubConfig::default()).await;
    let (mut ws, _) = server.connect().await;
    subscribe(&mut ws, "agent").await;
    server.wait_for_connections(1).await;

    ws.close(None).await.unwrap();
    server.wait_for_connections(0).await;
    assert_eq!(server.hub.subscription_count("agent").await, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn silent_connection_evicted_by_heartbeat() {
    let server = TestServer::start(HubConfig {
        heartbeat_interval: Duration::from_millis(100),
    })
    .await;

    // Never read again, so the heartbeat pings go unanswered
    let (_ws, _) = server.connect().await;
    server.wait_for_connections(1).await;
    server.wait_for_connections(0).await;

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_clients_normally() {
    let server = TestServer::start(HubConfig::default()).await;
    let (mut ws, _) = server.connect().await;
    server.wait_for_connections(1).await;

    let hub = Arc::clone(&server.hub);
    server.shutdown().await;

    let close = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {:?}", other),
            }
        }
    })
    .await
    .expect("no close frame");

    let frame = close.expect("close frame without code");
    assert_eq!(u16::from(frame.code), 1000);
    assert_eq!(frame.reason, "server shutting down");
    assert_eq!(hub.connection_count().await, 0);
}

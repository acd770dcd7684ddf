//! Gateway Client
//!
//! One logical connection to a gateway endpoint. A single task owns the
//! socket, the in-flight request table, the handshake phase and the backoff;
//! [`GatewayClient`] talks to it over a command channel.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use super::backoff::{Backoff, BackoffConfig};
use super::error::{GatewayError, GatewayResult};
use super::listener::{GatewayEvent, GatewayListener};
use super::pending::{Completion, PendingRequests};
use super::state::ConnectionState;
use crate::protocol::{
    AuthToken, ChallengePayload, ChatEvent, ClientIdentity, ConnectParams, EventFrame, Frame,
    HelloOk, RequestFrame, ResponseFrame, CHALLENGE_EVENT, CHAT_EVENT, CLOSE_CONNECT_FAILED,
    CONNECT_METHOD, PRESENCE_EVENT, PROTOCOL_VERSION,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Gateway client configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Endpoint URL (`ws://` or `wss://`)
    pub url: String,
    /// Bearer credential presented during the handshake
    pub token: Option<String>,
    pub client_id: String,
    pub client_version: String,
    pub display_name: Option<String>,
    pub platform: String,
    pub mode: String,
    pub role: String,
    pub scopes: Vec<String>,
    pub caps: Vec<String>,
    pub locale: String,
    /// How long to wait for a challenge before sending `connect` anyway
    pub connect_delay: Duration,
    pub backoff: BackoffConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:18789".to_string(),
            token: None,
            client_id: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            display_name: None,
            platform: std::env::consts::OS.to_string(),
            mode: "ui".to_string(),
            role: "operator".to_string(),
            scopes: vec!["operator.read".to_string(), "operator.write".to_string()],
            caps: Vec::new(),
            locale: "en-US".to_string(),
            connect_delay: Duration::from_millis(750),
            backoff: BackoffConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build the `connect` request parameters
    pub fn connect_params(&self, instance_id: &str, nonce: Option<String>) -> ConnectParams {
        ConnectParams {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client: ClientIdentity {
                id: self.client_id.clone(),
                display_name: self.display_name.clone(),
                version: self.client_version.clone(),
                platform: self.platform.clone(),
                mode: self.mode.clone(),
                instance_id: instance_id.to_string(),
            },
            role: self.role.clone(),
            scopes: self.scopes.clone(),
            caps: self.caps.clone(),
            auth: self.token.clone().map(|token| AuthToken { token }),
            user_agent: format!("{}/{}", self.client_id, self.client_version),
            locale: self.locale.clone(),
            nonce,
        }
    }
}

enum Command {
    Request {
        method: String,
        params: Value,
        reply: Completion,
    },
    Stop,
}

struct Worker {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Handle to a reconnecting gateway connection
pub struct GatewayClient {
    config: Arc<GatewayConfig>,
    listener: Arc<dyn GatewayListener>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    worker: Mutex<Option<Worker>>,
    instance_id: String,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, listener: impl GatewayListener) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config: Arc::new(config),
            listener: Arc::new(listener),
            state_tx: Arc::new(state_tx),
            state_rx,
            worker: Mutex::new(None),
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a client whose events arrive on a channel
    pub fn with_channel(config: GatewayConfig) -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(config, tx), rx)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start connecting. Does nothing if already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut worker = self.lock_worker();
        if worker.as_ref().is_some_and(|w| !w.task.is_finished()) {
            return;
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let task = ConnectionTask {
            config: Arc::clone(&self.config),
            listener: Arc::clone(&self.listener),
            state: Arc::clone(&self.state_tx),
            commands: commands_rx,
            pending: PendingRequests::default(),
            backoff: Backoff::new(self.config.backoff),
            instance_id: self.instance_id.clone(),
            last_seq: None,
        };

        tracing::info!(url = %self.config.url, "Starting gateway client");
        *worker = Some(Worker {
            commands: commands_tx,
            task: tokio::spawn(task.run()),
        });
    }

    /// Close the connection and stop reconnecting. Safe to call at any time.
    pub async fn stop(&self) {
        let worker = self.lock_worker().take();
        let Some(Worker { commands, task }) = worker else {
            return;
        };

        let _ = commands.send(Command::Stop);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Gateway connection task ended abnormally");
        }
        self.state_tx.send_if_modified(|state| {
            let changed = *state != ConnectionState::Disconnected;
            *state = ConnectionState::Disconnected;
            changed
        });
    }

    /// Send a request and wait for its response.
    ///
    /// Fails immediately with [`GatewayError::NotConnected`] unless the
    /// handshake has completed. There is no deadline.
    pub async fn request(&self, method: impl Into<String>, params: Value) -> GatewayResult<Value> {
        let commands = self
            .lock_worker()
            .as_ref()
            .map(|w| w.commands.clone())
            .ok_or(GatewayError::NotConnected)?;

        if !self.state().is_connected() {
            return Err(GatewayError::NotConnected);
        }

        let (reply, response) = oneshot::channel();
        commands
            .send(Command::Request {
                method: method.into(),
                params,
                reply,
            })
            .map_err(|_| GatewayError::NotConnected)?;

        response.await.map_err(|_| GatewayError::ConnectionClosed)?
    }

    /// `chat.send`; a fresh idempotency key is generated when none is given
    pub async fn chat_send(
        &self,
        session_key: &str,
        message: &str,
        idempotency_key: Option<&str>,
    ) -> GatewayResult<Value> {
        let idempotency_key = idempotency_key
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.request(
            "chat.send",
            json!({
                "sessionKey": session_key,
                "message": message,
                "idempotencyKey": idempotency_key,
            }),
        )
        .await
    }

    pub async fn chat_history(&self, session_key: &str, limit: Option<u32>) -> GatewayResult<Value> {
        let mut params = json!({ "sessionKey": session_key });
        if let Some(limit) = limit {
            params["limit"] = json!(limit);
        }
        self.request("chat.history", params).await
    }

    pub async fn chat_abort(&self, session_key: &str, run_id: Option<&str>) -> GatewayResult<Value> {
        let mut params = json!({ "sessionKey": session_key });
        if let Some(run_id) = run_id {
            params["runId"] = json!(run_id);
        }
        self.request("chat.abort", params).await
    }

    pub async fn sessions_list(&self) -> GatewayResult<Value> {
        self.request("sessions.list", json!({})).await
    }

    pub async fn node_list(&self) -> GatewayResult<Value> {
        self.request("node.list", json!({})).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Identifier sent as `client.instanceId`, stable for this client's lifetime
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Where the `connect` request stands on the current physical connection
#[derive(Debug, Clone, PartialEq, Eq)]
enum Handshake {
    Pending,
    Sent { request_id: String },
    Ready,
}

impl Handshake {
    fn is_pending(&self) -> bool {
        matches!(self, Handshake::Pending)
    }

    fn awaits(&self, id: &str) -> bool {
        matches!(self, Handshake::Sent { request_id } if request_id == id)
    }
}

enum Connect {
    Open(WsStream),
    Failed(GatewayError),
    Stopped,
}

enum SessionEnd {
    Dropped { code: Option<u16>, reason: String },
    Stopped,
}

impl SessionEnd {
    fn dropped(code: Option<u16>, reason: impl Into<String>) -> Self {
        SessionEnd::Dropped {
            code,
            reason: reason.into(),
        }
    }
}

struct ConnectionTask {
    config: Arc<GatewayConfig>,
    listener: Arc<dyn GatewayListener>,
    state: Arc<watch::Sender<ConnectionState>>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: PendingRequests,
    backoff: Backoff,
    instance_id: String,
    last_seq: Option<u64>,
}

impl ConnectionTask {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);

            let end = match self.connect_once().await {
                Connect::Open(stream) => self.session(stream).await,
                Connect::Failed(e) => {
                    tracing::warn!(url = %self.config.url, error = %e, "Gateway connect failed");
                    SessionEnd::dropped(None, e.to_string())
                }
                Connect::Stopped => SessionEnd::Stopped,
            };

            self.set_state(ConnectionState::Disconnected);
            let rejected = self.pending.reject_all();
            if rejected > 0 {
                tracing::debug!(rejected, "Rejected pending gateway requests");
            }

            match end {
                SessionEnd::Stopped => break,
                SessionEnd::Dropped { code, reason } => {
                    self.listener.on_close(code, &reason);
                }
            }

            let delay = self.backoff.next_delay();
            tracing::info!(delay_ms = delay.as_millis() as u64, "Gateway reconnect scheduled");
            if !self.wait_for_retry(delay).await {
                break;
            }
        }

        tracing::debug!("Gateway connection task stopped");
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::debug!(state = %state, "Gateway state changed");
            self.listener.on_state_change(state);
        }
    }

    /// Open the transport, answering commands while the dial is in flight
    async fn connect_once(&mut self) -> Connect {
        let connect = connect_async(self.config.url.clone());
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok((stream, _response)) => Connect::Open(stream),
                        Err(e) => Connect::Failed(e.into()),
                    };
                }
                command = self.commands.recv() => match command {
                    Some(Command::Request { reply, .. }) => {
                        let _ = reply.send(Err(GatewayError::NotConnected));
                    }
                    Some(Command::Stop) | None => return Connect::Stopped,
                },
            }
        }
    }

    /// Sleep out the backoff. Returns false if stopped meanwhile.
    async fn wait_for_retry(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Request { reply, .. }) => {
                        let _ = reply.send(Err(GatewayError::NotConnected));
                    }
                    Some(Command::Stop) | None => return false,
                },
            }
        }
    }

    /// Drive one physical connection until it drops or we are stopped
    async fn session(&mut self, stream: WsStream) -> SessionEnd {
        let (mut sink, mut source) = stream.split();
        let mut handshake = Handshake::Pending;
        self.last_seq = None;

        tracing::debug!(url = %self.config.url, "Gateway transport open");

        let connect_timer = tokio::time::sleep(self.config.connect_delay);
        tokio::pin!(connect_timer);

        loop {
            tokio::select! {
                () = &mut connect_timer, if handshake.is_pending() => {
                    if let Err(e) = self.send_connect(&mut sink, &mut handshake, None).await {
                        return SessionEnd::dropped(None, e.to_string());
                    }
                }
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(end) = self.handle_text(&text, &mut sink, &mut handshake).await {
                            return end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                            None => (None, String::new()),
                        };
                        tracing::info!(code = ?code, reason = %reason, "Gateway closed connection");
                        return SessionEnd::Dropped { code, reason };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Gateway transport error");
                        return SessionEnd::dropped(None, e.to_string());
                    }
                    None => return SessionEnd::dropped(None, "connection ended"),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Request { method, params, reply }) => {
                        if let Err(e) = self.send_request(&mut sink, &handshake, method, params, reply).await {
                            tracing::warn!(error = %e, "Gateway send failed");
                            return SessionEnd::dropped(None, e.to_string());
                        }
                    }
                    Some(Command::Stop) | None => {
                        close(&mut sink, CloseCode::Normal, "client stopped").await;
                        return SessionEnd::Stopped;
                    }
                },
            }
        }
    }

    /// Send `connect` if it has not been sent on this connection yet
    async fn send_connect(
        &mut self,
        sink: &mut WsSink,
        handshake: &mut Handshake,
        nonce: Option<String>,
    ) -> GatewayResult<()> {
        if !handshake.is_pending() {
            return Ok(());
        }

        let params = self.config.connect_params(&self.instance_id, nonce);
        let request = RequestFrame::new(CONNECT_METHOD, serde_json::to_value(&params)?);
        let request_id = request.id.clone();
        let text = Frame::Req(request).to_text()?;

        *handshake = Handshake::Sent { request_id };
        sink.send(Message::Text(text)).await?;

        tracing::debug!(with_nonce = params.nonce.is_some(), "Gateway handshake sent");
        Ok(())
    }

    async fn send_request(
        &mut self,
        sink: &mut WsSink,
        handshake: &Handshake,
        method: String,
        params: Value,
        reply: Completion,
    ) -> GatewayResult<()> {
        if *handshake != Handshake::Ready {
            let _ = reply.send(Err(GatewayError::NotConnected));
            return Ok(());
        }

        let request = RequestFrame::new(method, params);
        let id = request.id.clone();
        let text = match Frame::Req(request).to_text() {
            Ok(text) => text,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return Ok(());
            }
        };

        self.pending.insert(id.clone(), reply);
        sink.send(Message::Text(text)).await?;

        tracing::trace!(id = %id, inflight = self.pending.len(), "Gateway request sent");
        Ok(())
    }

    /// Handle one text frame. Returns `Some` when the session must end.
    async fn handle_text(
        &mut self,
        text: &str,
        sink: &mut WsSink,
        handshake: &mut Handshake,
    ) -> Option<SessionEnd> {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed gateway frame");
                return None;
            }
        };

        match frame {
            Frame::Res(response) if handshake.awaits(&response.id) => {
                self.complete_handshake(response, sink, handshake).await
            }
            Frame::Res(response) => {
                self.pending.resolve(response);
                None
            }
            Frame::Event(event) => {
                if let Err(e) = self.dispatch_event(event, sink, handshake).await {
                    return Some(SessionEnd::dropped(None, e.to_string()));
                }
                None
            }
            Frame::Req(request) => {
                tracing::debug!(method = %request.method, "Ignoring request from gateway");
                None
            }
        }
    }

    async fn complete_handshake(
        &mut self,
        response: ResponseFrame,
        sink: &mut WsSink,
        handshake: &mut Handshake,
    ) -> Option<SessionEnd> {
        match response.into_result() {
            Ok(payload) => {
                let hello = HelloOk::from_payload(payload);
                *handshake = Handshake::Ready;
                self.backoff.reset();
                self.set_state(ConnectionState::Connected);
                tracing::info!(protocol = ?hello.protocol, "Gateway handshake complete");
                self.listener.on_ready(&hello);
                None
            }
            Err(error) => {
                tracing::warn!(code = ?error.code, message = %error.message, "Gateway rejected connect");
                let reason = "connect failed";
                close(sink, CloseCode::from(CLOSE_CONNECT_FAILED), reason).await;
                Some(SessionEnd::dropped(Some(CLOSE_CONNECT_FAILED), reason))
            }
        }
    }

    async fn dispatch_event(
        &mut self,
        event: EventFrame,
        sink: &mut WsSink,
        handshake: &mut Handshake,
    ) -> GatewayResult<()> {
        self.track_seq(event.seq);

        match event.event.as_str() {
            CHALLENGE_EVENT => match ChallengePayload::deserialize(&event.payload) {
                Ok(challenge) if handshake.is_pending() => {
                    self.send_connect(sink, handshake, Some(challenge.nonce))
                        .await?;
                }
                Ok(_) => {
                    tracing::debug!("Challenge after connect was sent, ignoring");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed connect challenge");
                }
            },
            CHAT_EVENT => match ChatEvent::from_payload(&event.payload) {
                Ok(chat) => self.listener.on_chat(chat),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed chat event");
                }
            },
            PRESENCE_EVENT => self.listener.on_presence(&event.payload),
            _ => self.listener.on_event(&event),
        }
        Ok(())
    }

    fn track_seq(&mut self, seq: Option<u64>) {
        let Some(seq) = seq else {
            return;
        };
        if let Some(last) = self.last_seq {
            let expected = last + 1;
            if seq != expected {
                tracing::debug!(expected, received = seq, "Gateway event sequence gap");
            }
        }
        self.last_seq = Some(seq);
    }
}

async fn close(sink: &mut WsSink, code: CloseCode, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Gateway close frame not sent");
    }
}

//! WebSocket Connection Hub
//!
//! Manages all WebSocket connections, their topic subscriptions, heartbeat
//! liveness and message broadcasting.
//!
//! Each connection is represented by an outbound channel to its writer task,
//! so the hub never awaits a peer's socket and one slow client cannot hold up
//! delivery to the others.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messages::{HubEvent, Outbound, ServerMessage};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Longest topic name accepted
const MAX_TOPIC_LEN: usize = 128;

/// Close code sent to every connection on shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Manages all WebSocket connections and subscriptions
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    /// Topic subscriptions: Topic → Set of ConnectionIds
    subscriptions: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    /// Sequence number stamped on broadcast events
    seq: AtomicU64,
    /// Running heartbeat sweep, if started
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    /// Configuration
    config: HubConfig,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Time between heartbeat sweeps
    pub heartbeat_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// What the hub knows about the remote end of a connection
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<SocketAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Registry entry for one connection
struct ConnectionHandle {
    /// Channel to this connection's writer task
    sender: mpsc::UnboundedSender<Outbound>,
    /// Topics this connection is subscribed to
    subscriptions: HashSet<String>,
    /// Cleared on every heartbeat probe, set again when the peer answers
    alive: bool,
    last_heartbeat: DateTime<Utc>,
    connected_at: DateTime<Utc>,
    peer: PeerInfo,
    /// Fired to drop the socket without a close handshake
    terminate: Option<oneshot::Sender<()>>,
}

/// Returned by [`ConnectionHub::register`]
#[derive(Debug)]
pub struct Registration {
    pub id: ConnectionId,
    /// Resolves with `Ok(())` when the hub forcibly evicts this connection
    pub terminated: oneshot::Receiver<()>,
}

/// Point-in-time view of a connection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub peer: PeerInfo,
    pub topics: Vec<String>,
    pub alive: bool,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

/// Result of one heartbeat sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections sent a fresh probe
    pub probed: usize,
    /// Connections terminated for missing the previous probe
    pub evicted: usize,
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            heartbeat: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Register a new WebSocket connection and queue its welcome message
    pub async fn register(
        &self,
        sender: mpsc::UnboundedSender<Outbound>,
        peer: PeerInfo,
    ) -> Registration {
        let id = Uuid::new_v4().to_string();
        let (terminate, terminated) = oneshot::channel();
        let now = Utc::now();

        let welcome = ServerMessage::Connected {
            connection_id: id.clone(),
        };
        if sender.send(Outbound::Message(welcome)).is_err() {
            tracing::debug!(connection_id = %id, "Writer gone before welcome was queued");
        }

        let handle = ConnectionHandle {
            sender,
            subscriptions: HashSet::new(),
            alive: true,
            last_heartbeat: now,
            connected_at: now,
            peer,
            terminate: Some(terminate),
        };
        self.connections.write().await.insert(id.clone(), handle);

        tracing::info!(connection_id = %id, "WebSocket connected");
        Registration { id, terminated }
    }

    /// Unregister a connection and clean up its subscriptions
    pub async fn unregister(&self, id: &str) {
        let removed = self.detach(&[id.to_string()]).await;
        if !removed.is_empty() {
            tracing::info!(connection_id = %id, "WebSocket disconnected");
        }
    }

    /// Remove connections from both indexes, returning their handles
    async fn detach(&self, ids: &[ConnectionId]) -> Vec<(ConnectionId, ConnectionHandle)> {
        let mut connections = self.connections.write().await;
        let mut subs = self.subscriptions.write().await;

        let mut removed = Vec::new();
        for id in ids {
            if let Some(handle) = connections.remove(id) {
                for topic in &handle.subscriptions {
                    if let Some(subscribers) = subs.get_mut(topic) {
                        subscribers.remove(id);
                        // Clean up empty topic entries
                        if subscribers.is_empty() {
                            subs.remove(topic);
                        }
                    }
                }
                removed.push((id.clone(), handle));
            }
        }
        removed
    }

    /// Record a heartbeat answer from a connection
    pub async fn mark_alive(&self, id: &str) {
        if let Some(handle) = self.connections.write().await.get_mut(id) {
            handle.alive = true;
            handle.last_heartbeat = Utc::now();
        }
    }

    /// Subscribe a connection to a topic
    pub async fn subscribe(&self, id: &str, topic: &str) -> Result<(), HubError> {
        if !is_valid_topic(topic) {
            return Err(HubError::InvalidTopic(topic.to_string()));
        }

        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.subscriptions.write().await;
        handle.subscriptions.insert(topic.to_string());
        subs.entry(topic.to_string())
            .or_default()
            .insert(id.to_string());

        tracing::debug!(connection_id = %id, topic = %topic, "Subscribed to topic");
        Ok(())
    }

    /// Unsubscribe a connection from a topic
    ///
    /// Returns whether the connection had been subscribed.
    pub async fn unsubscribe(&self, id: &str, topic: &str) -> Result<bool, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut subs = self.subscriptions.write().await;
        let was_subscribed = handle.subscriptions.remove(topic);
        if let Some(subscribers) = subs.get_mut(topic) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                subs.remove(topic);
            }
        }

        tracing::debug!(connection_id = %id, topic = %topic, "Unsubscribed from topic");
        Ok(was_subscribed)
    }

    /// Broadcast an event to every connection, or to a topic's subscribers
    ///
    /// Returns the number of connections the event was queued for. A failed
    /// send to one connection is logged and skipped.
    pub async fn broadcast(&self, event: HubEvent) -> usize {
        let connections = self.connections.read().await;

        let targets: Vec<&ConnectionId> = match &event.topic {
            None => connections.keys().collect(),
            Some(topic) => {
                let subs = self.subscriptions.read().await;
                match subs.get(topic) {
                    Some(ids) => connections
                        .keys()
                        .filter(|id| ids.contains(id.as_str()))
                        .collect(),
                    None => Vec::new(),
                }
            }
        };

        if targets.is_empty() {
            tracing::trace!(event = %event.event, topic = ?event.topic, "Broadcast with no recipients");
            return 0;
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let event_name = event.event.clone();
        let message = event.into_message(seq);

        let mut sent_count = 0;
        for id in targets {
            if let Some(handle) = connections.get(id) {
                match handle.sender.send(Outbound::Message(message.clone())) {
                    Ok(()) => sent_count += 1,
                    Err(_) => {
                        tracing::warn!(connection_id = %id, event = %event_name, "Broadcast to closed connection skipped");
                    }
                }
            }
        }

        tracing::trace!(event = %event_name, seq, recipients = sent_count, "Broadcast event");
        sent_count
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        handle
            .sender
            .send(Outbound::Message(message))
            .map_err(|_| HubError::SendFailed)
    }

    /// Run one heartbeat pass.
    ///
    /// Connections that did not answer the previous probe are terminated and
    /// removed; every other connection is marked unanswered and probed again.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut dead = Vec::new();

        {
            let mut connections = self.connections.write().await;
            for (id, handle) in connections.iter_mut() {
                if !handle.alive {
                    dead.push(id.clone());
                    continue;
                }
                handle.alive = false;
                if handle.sender.send(Outbound::Ping).is_ok() {
                    report.probed += 1;
                } else {
                    tracing::debug!(connection_id = %id, "Heartbeat probe to closed connection");
                }
            }
        }

        if dead.is_empty() {
            return report;
        }

        for (id, mut handle) in self.detach(&dead).await {
            tracing::warn!(
                connection_id = %id,
                last_heartbeat = %handle.last_heartbeat,
                "Heartbeat missed, terminating connection"
            );
            if let Some(terminate) = handle.terminate.take() {
                let _ = terminate.send(());
            }
            report.evicted += 1;
        }
        report
    }

    /// Start the periodic heartbeat sweep. Calling it again while a sweep is
    /// already running does nothing.
    pub async fn start_heartbeat(self: &Arc<Self>) {
        let mut slot = self.heartbeat.lock().await;
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let hub = Arc::clone(self);
        let period = self.config.heartbeat_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let report = hub.sweep().await;
                if report.evicted > 0 {
                    tracing::info!(
                        probed = report.probed,
                        evicted = report.evicted,
                        "Heartbeat sweep"
                    );
                }
            }
        }));

        tracing::debug!(interval_secs = period.as_secs(), "Heartbeat started");
    }

    /// Stop the heartbeat, close every connection normally and clear the
    /// registry. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(task) = self.heartbeat.lock().await.take() {
            task.abort();
        }

        let mut connections = self.connections.write().await;
        let mut subs = self.subscriptions.write().await;

        let count = connections.len();
        for (_, handle) in connections.drain() {
            let _ = handle.sender.send(Outbound::Close {
                code: CLOSE_NORMAL,
                reason: "server shutting down".to_string(),
            });
        }
        subs.clear();

        if count > 0 {
            tracing::info!(connections = count, "Connection hub shut down");
        }
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Get subscription count for a topic
    pub async fn subscription_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .await
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Snapshot of all registered connections
    pub async fn connections(&self) -> Vec<ConnectionInfo> {
        let connections = self.connections.read().await;
        let mut infos: Vec<ConnectionInfo> = connections
            .iter()
            .map(|(id, handle)| {
                let mut topics: Vec<String> = handle.subscriptions.iter().cloned().collect();
                topics.sort();
                ConnectionInfo {
                    id: id.clone(),
                    peer: handle.peer.clone(),
                    topics,
                    alive: handle.alive,
                    connected_at: handle.connected_at,
                    last_heartbeat: handle.last_heartbeat,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));
        infos
    }
}

/// Check if a topic name is acceptable
fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LEN
        && !topic.chars().any(char::is_whitespace)
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Invalid topic: {0:?}")]
    InvalidTopic(String),

    #[error("Failed to send message")]
    SendFailed,
}

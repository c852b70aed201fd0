//! Connection state and hub management.
//!
//! Uses lock-free DashMap for the connection table. Each connection carries
//! a single session slot behind its own async mutex, so subscribe,
//! re-subscribe, and disconnect for one connection are processed in arrival
//! order while different connections never contend.

use crate::error::{GatewayError, Result};
use crate::protocol::SubscribeRequest;
use crate::registry::WorkerRegistry;
use crate::resource::ResourceKey;
use crate::session::SubscriptionSession;
use axum::extract::ws::Message;
use chrono::Utc;
use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Unique client identifier.
pub type ClientId = Uuid;

/// Outbound channel capacity per connection. A subscriber this far behind
/// is treated as gone rather than buffered for.
pub const CONNECTION_BUFFER_SIZE: usize = 64;

/// Outbound state for a single connected client.
pub struct ConnectionState {
    /// Unique client identifier.
    pub id: ClientId,
    /// Channel to the connection's WebSocket forwarder task. Bounded so a
    /// stalled client fails fast instead of queueing without limit.
    pub tx: mpsc::Sender<Message>,
    /// Timestamp when the client connected.
    pub connected_at: i64,
    /// Timestamp of last ping received.
    pub last_ping: AtomicI64,
}

impl ConnectionState {
    /// Create state for a newly accepted connection.
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            tx,
            connected_at: now,
            last_ping: AtomicI64::new(now),
        }
    }

    /// Serialize and send a message to this client.
    pub fn send<T: Serialize>(&self, msg: &T) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.send_text(json)
    }

    /// Send pre-serialized JSON text. Non-blocking; a full or closed
    /// channel is an error that callers treat as a lost transport.
    pub fn send_text(&self, json: String) -> Result<()> {
        self.tx
            .try_send(Message::Text(json.into()))
            .map_err(|_| GatewayError::ChannelSend)
    }

    /// Try to send a raw message. Returns false if the channel is full or
    /// closed.
    pub fn try_send_raw(&self, msg: Message) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Update the last ping timestamp.
    pub fn update_ping(&self) {
        self.last_ping
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Get the last ping timestamp.
    pub fn last_ping_time(&self) -> i64 {
        self.last_ping.load(Ordering::Relaxed)
    }
}

/// One live connection: outbound state plus its session slot.
pub struct ConnectionEntry {
    /// Outbound transport state, shared with the session task.
    pub state: Arc<ConnectionState>,
    /// At most one active session per connection; the mutex serializes the
    /// stop-then-start of re-subscribe against disconnect.
    session: Mutex<Option<SubscriptionSession>>,
}

/// Connection hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Root directory that resource folders are resolved against.
    pub data_dir: PathBuf,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
        }
    }
}

/// Tracks live client connections and routes their control messages.
pub struct ConnectionHub {
    /// Client ID → connection entry.
    connections: DashMap<ClientId, Arc<ConnectionEntry>>,
    /// Shared worker registry; session tasks release into it on exit.
    registry: Arc<WorkerRegistry>,
    config: HubConfig,
}

impl ConnectionHub {
    /// Create a hub over the given worker registry.
    pub fn new(registry: Arc<WorkerRegistry>, config: HubConfig) -> Self {
        Self {
            connections: DashMap::new(),
            registry,
            config,
        }
    }

    /// Register a new connection with no active session.
    pub fn on_connect(&self, tx: mpsc::Sender<Message>) -> Arc<ConnectionEntry> {
        let state = Arc::new(ConnectionState::new(tx));
        let entry = Arc::new(ConnectionEntry {
            state,
            session: Mutex::new(None),
        });
        self.connections.insert(entry.state.id, entry.clone());
        info!("Client {} registered", entry.state.id);
        entry
    }

    /// Handle one inbound control message: parse the subscription, swap out
    /// any running session, and start the new one.
    ///
    /// The old session is fully stopped (and its registry reference
    /// released) before the new key is acquired; last subscription wins. On
    /// error nothing changes except that a replaced session stays stopped.
    pub async fn on_message(&self, entry: &Arc<ConnectionEntry>, raw: &[u8]) -> Result<()> {
        let request: SubscribeRequest = serde_json::from_slice(raw)?;
        let Some((folder, name)) = request.resource() else {
            return Err(GatewayError::MissingResourceFields);
        };
        let key = ResourceKey::new(folder, name);
        debug!("Client {} subscribing to {}", entry.state.id, key);

        let mut slot = entry.session.lock().await;

        if let Some(mut old) = slot.take() {
            old.stop().await;
        }

        self.registry.acquire(&key, request.offset_secs()).await?;

        let path = key.path_in(&self.config.data_dir);
        *slot = Some(SubscriptionSession::spawn(
            entry.state.clone(),
            key,
            path,
            request.poll_interval(),
            self.registry.clone(),
        ));

        counter!("gateway_subscriptions_total").increment(1);
        Ok(())
    }

    /// Drop a connection and stop its session, if any.
    ///
    /// Removing the entry first makes a racing second invocation a no-op,
    /// and the session's own exit path has already handled the registry
    /// reference if the session self-disconnected earlier.
    pub async fn on_disconnect(&self, id: &ClientId) {
        let Some((_, entry)) = self.connections.remove(id) else {
            return;
        };
        let mut slot = entry.session.lock().await;
        if let Some(mut session) = slot.take() {
            session.stop().await;
        }
        info!("Client {} unregistered", id);
    }

    /// Stop every session and drop every connection.
    pub async fn shutdown(&self) {
        let ids: Vec<ClientId> = self.connections.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.on_disconnect(&id).await;
        }
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.connections.len()
    }

    /// The worker registry this hub acquires from.
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }
}

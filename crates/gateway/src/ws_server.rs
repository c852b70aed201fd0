//! WebSocket server handler using Axum.

use crate::error::{GatewayError, Result};
use crate::hub::{ConnectionEntry, ConnectionHub, CONNECTION_BUFFER_SIZE};
use crate::protocol::ErrorReply;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Shared application state.
pub struct AppState {
    pub hub: Arc<ConnectionHub>,
}

/// Create the WebSocket router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let clients = state.hub.client_count();
    let sessions = state.hub.registry().total_refs().await;
    let workers = state.hub.registry().worker_count().await;
    format!(
        r#"{{"status":"ok","clients":{},"sessions":{},"workers":{}}}"#,
        clients, sessions, workers
    )
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Split the socket into sender and receiver
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Bounded channel for outgoing messages; sessions fail fast on overflow
    let (tx, mut rx) = mpsc::channel::<Message>(CONNECTION_BUFFER_SIZE);

    // Register with the hub (no session until the client subscribes)
    let entry = state.hub.on_connect(tx);
    let client_id = entry.state.id;

    counter!("gateway_connections_total").increment(1);
    gauge!("gateway_active_connections").set(state.hub.client_count() as f64);

    info!("Client {} connected", client_id);

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Ping interval for keepalive
    let mut ping_interval = interval(Duration::from_secs(30));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Handle incoming messages
    loop {
        tokio::select! {
            biased;

            // Handle incoming WebSocket messages
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        if let Err(e) = handle_message(&state, &entry, msg).await {
                            warn!("Error handling message from {}: {}", client_id, e);
                            // Send error to client
                            let _ = entry.state.send(&ErrorReply::new(e.to_string()));
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {:?}", client_id, e);
                        break;
                    }
                    None => {
                        // Connection closed
                        break;
                    }
                }
            }

            // Send ping periodically
            _ = ping_interval.tick() => {
                if !entry.state.try_send_raw(Message::Ping(vec![].into())) {
                    break;
                }
            }
        }
    }

    // Cleanup: the hub stops the session, whose task returns its registry
    // reference before the stop completes
    state.hub.on_disconnect(&client_id).await;
    send_task.abort();

    counter!("gateway_disconnections_total").increment(1);
    gauge!("gateway_active_connections").set(state.hub.client_count() as f64);

    info!("Client {} disconnected", client_id);
}

/// Handle a single WebSocket message.
async fn handle_message(
    state: &Arc<AppState>,
    entry: &Arc<ConnectionEntry>,
    msg: Message,
) -> Result<()> {
    match msg {
        Message::Text(text) => state.hub.on_message(entry, text.as_bytes()).await,
        Message::Binary(data) => state.hub.on_message(entry, &data).await,
        Message::Ping(data) => {
            entry.state.update_ping();
            entry
                .state
                .tx
                .try_send(Message::Pong(data))
                .map_err(|_| GatewayError::ChannelSend)?;
            Ok(())
        }
        Message::Pong(_) => {
            entry.state.update_ping();
            Ok(())
        }
        Message::Close(_) => {
            // Will be handled by the connection loop
            Ok(())
        }
    }
}

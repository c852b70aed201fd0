//! Per-subscription polling loop.

use crate::error::Result;
use crate::hub::ConnectionState;
use crate::protocol::EMPTY_PAYLOAD;
use crate::registry::WorkerRegistry;
use crate::resource::ResourceKey;
use metrics::counter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One client's active subscription: a cancellable task that reads the
/// resource fresh every cycle and pushes its contents to that client.
///
/// The task owns the registry reference for its key and releases it as its
/// final act, so every exit path (stop, transport loss, cycle error)
/// releases exactly once.
pub struct SubscriptionSession {
    key: ResourceKey,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SubscriptionSession {
    /// Start the polling loop for one subscriber.
    ///
    /// The registry reference for `key` must already be held; the spawned
    /// task assumes ownership of it.
    pub fn spawn(
        state: Arc<ConnectionState>,
        key: ResourceKey,
        path: PathBuf,
        interval: Duration,
        registry: Arc<WorkerRegistry>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            run_poll_loop(&state, &task_key, &path, interval, &task_cancel).await;
            registry.release(&task_key).await;
            debug!("Session for client {} on {} ended", state.id, task_key);
        });

        Self {
            key,
            cancel,
            handle: Some(handle),
        }
    }

    /// Request cancellation and wait until the task has fully exited,
    /// including its registry release. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!("Session task for {} panicked: {}", self.key, e);
                }
            }
        }
    }
}

/// Poll until cancelled or the transport goes away.
///
/// Cancellation is checked while reading and while sleeping, so a stop
/// request is observed before the next send at the latest.
async fn run_poll_loop(
    state: &ConnectionState,
    key: &ResourceKey,
    path: &Path,
    interval: Duration,
    cancel: &CancellationToken,
) {
    debug!(
        "Client {} following {} every {:?}",
        state.id, key, interval
    );

    loop {
        let payload = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            payload = poll_once(path) => payload,
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                // Not transient: ending the session beats holding the
                // registry reference behind a wedged loop.
                warn!("Session for {} on {} failed: {}", state.id, key, e);
                break;
            }
        };
        counter!("gateway_polls_total").increment(1);

        if cancel.is_cancelled() {
            break;
        }

        if state.send_text(payload).is_err() {
            debug!("Client {} transport gone, leaving {}", state.id, key);
            break;
        }
        counter!("gateway_messages_sent_total").increment(1);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// One poll cycle: read the resource fresh and render its payload.
///
/// Absent, unreadable, malformed, and row-less resources all render as the
/// empty object; the backing worker may still be producing its first output
/// or be mid-write, so those cases retry next cycle.
async fn poll_once(path: &Path) -> Result<String> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
                counter!("gateway_poll_errors_total").increment(1);
            }
            return Ok(EMPTY_PAYLOAD.to_string());
        }
    };

    let frame = match tabular::parse_frame(&bytes) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to parse {}: {}", path.display(), e);
            counter!("gateway_poll_errors_total").increment(1);
            return Ok(EMPTY_PAYLOAD.to_string());
        }
    };

    if frame.is_empty() {
        return Ok(EMPTY_PAYLOAD.to_string());
    }
    Ok(serde_json::to_string(&frame)?)
}

//! Wire protocol types for the streaming gateway.
//!
//! Defines the JSON message format for client-server communication.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default seconds between pushes when a subscriber omits `offset`.
pub const DEFAULT_OFFSET_SECS: f64 = 5.0;

/// Smallest accepted push interval. A zero offset would spin the poll loop
/// hot, fill the connection's bounded channel, and self-disconnect the
/// subscriber.
pub const MIN_OFFSET_SECS: f64 = 0.01;

/// Payload sent when the resource is absent, unreadable, or has no rows.
pub const EMPTY_PAYLOAD: &str = "{}";

// ============================================================================
// Client → Server Messages
// ============================================================================

/// Subscription request naming the resource to follow.
///
/// `offset` is the push interval in seconds; it is also handed to the
/// backing worker when an offset flag is configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Folder the resource lives in.
    #[serde(default)]
    pub file_folder: Option<String>,
    /// File name of the resource.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Seconds between pushes (defaults to 5).
    #[serde(default)]
    pub offset: Option<f64>,
}

impl SubscribeRequest {
    /// Folder and name when both are present and non-empty.
    pub fn resource(&self) -> Option<(&str, &str)> {
        match (self.file_folder.as_deref(), self.file_name.as_deref()) {
            (Some(folder), Some(name)) if !folder.is_empty() && !name.is_empty() => {
                Some((folder, name))
            }
            _ => None,
        }
    }

    /// Effective offset in seconds. Negative and non-finite values fall
    /// back to the default rather than poisoning the poll timer; valid
    /// values are clamped to [`MIN_OFFSET_SECS`].
    pub fn offset_secs(&self) -> f64 {
        match self.offset {
            Some(secs) if secs.is_finite() && secs >= 0.0 => secs.max(MIN_OFFSET_SECS),
            _ => DEFAULT_OFFSET_SECS,
        }
    }

    /// Delay between poll cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.offset_secs())
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_OFFSET_SECS))
    }
}

// ============================================================================
// Server → Client Messages
// ============================================================================

/// Error reply sent back on the offending connection.
///
/// Data messages have no wrapper type: the payload is the serialized column
/// frame itself (or [`EMPTY_PAYLOAD`]), produced by the session loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Human-readable error message.
    pub error: String,
}

impl ErrorReply {
    /// Create an error reply with the given message.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

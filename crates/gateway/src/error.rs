//! Gateway error types.

use thiserror::Error;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Subscribe request without a usable resource folder or file name.
    /// The display text is the exact wire payload clients expect.
    #[error("Missing fileFolder or fileName in received data")]
    MissingResourceFields,

    /// Backing worker process could not be started.
    #[error("failed to start worker for {resource}: {source}")]
    WorkerSpawn {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel send error.
    #[error("Channel send error")]
    ChannelSend,
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

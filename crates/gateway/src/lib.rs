//! Gateway service for real-time streaming of shared tabular resources.
//!
//! This service:
//! - Accepts WebSocket connections from data clients
//! - Maps each subscription to one on-disk tabular resource (folder + name)
//! - Keeps exactly one reference-counted backing worker process per
//!   distinct resource, shared across all of its subscribers
//! - Polls the resource on each subscriber's interval and pushes its
//!   contents as column-oriented JSON
//!
//! ## Architecture
//!
//! ```text
//! WebSocket clients
//!         ↓
//! ws_server (axum upgrade, per-connection read loop)
//!         ↓
//! ConnectionHub (DashMap of connections, one session slot each)
//!     ↓                        ↓
//! SubscriptionSession     WorkerRegistry (refcounted external processes)
//!     ↓
//! tabular files on disk (kept fresh by the workers)
//! ```
//!
//! ## Lifecycle Design
//!
//! - One task per connection read loop, one task per active session
//! - A session's task releases its registry reference as its final act, so
//!   every exit path releases exactly once
//! - Re-subscribe stops and joins the old session before acquiring the new
//!   key: last subscription wins, never two sessions per connection
//! - Registry check-spawn and check-kill each run under one lock; a worker
//!   dies only when its reference count reaches zero

pub mod error;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod resource;
pub mod session;
pub mod ws_server;

pub use error::{GatewayError, Result};
pub use hub::{ClientId, ConnectionEntry, ConnectionHub, ConnectionState, HubConfig};
pub use protocol::{ErrorReply, SubscribeRequest, DEFAULT_OFFSET_SECS, EMPTY_PAYLOAD, MIN_OFFSET_SECS};
pub use registry::{WorkerCommand, WorkerRegistry};
pub use resource::ResourceKey;
pub use session::SubscriptionSession;
pub use ws_server::{create_router, AppState};

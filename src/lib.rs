#![doc(html_root_url = "https://docs.rs/wiregate/latest")]
//! Public API for the `wiregate` library.
//!
//! This crate provides a persistent-connection gateway client: a
//! WebSocket-style frame codec, per-shard connection state machines with
//! heartbeat and resume handling, a supervisory registry that owns the
//! transports, and a thread pool for offloading event handlers.

pub mod assembler;
pub mod config;
pub mod envelope;
pub mod error;
/// Result type alias re-exported for convenience when working with the
/// registry and its handle.
pub use error::{GatewayError, Result};
pub mod event;
pub mod frame;
pub mod registry;
pub mod shard;
pub mod task_pool;

pub use assembler::{ExtractedFrame, MessageAssembler};
pub use config::{GatewayConfig, Presence};
pub use envelope::{Envelope, WireFormat};
pub use event::{AggregateCache, CacheUpdate, EventRegistry, EventSink, GatewayEvent, NoopSink};
pub use registry::{Connector, RegistryHandle, ShardRegistry, TcpConnector};
pub use shard::{
    CloseReason,
    ConnectionState,
    MediaSessionData,
    MediaSessionRequest,
    ShardConnection,
    ShardId,
};
pub use task_pool::{TaskHandle, TaskPool};

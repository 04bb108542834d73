//! Typed gateway events and the dispatcher boundary.
//!
//! Dispatch payloads decode through an [`EventRegistry`] keyed by event
//! name, populated once at startup. Decoded events flow to an
//! [`EventSink`]; cache synchronization happens through the explicit
//! [`CacheUpdate`] interface rather than as a side effect of decoding.

pub mod cache;
pub mod registry;
pub mod types;

use std::time::Duration;

pub use cache::{AggregateCache, CacheUpdate};
pub use registry::{EventDecoder, EventError, EventRegistry};
pub use types::GatewayEvent;

/// Consumer of decoded gateway events.
///
/// Runs inline on the supervisory thread; implementations that need to do
/// real work should offload to the [`crate::task_pool::TaskPool`].
pub trait EventSink: Send + Sync {
    /// Called once per decoded dispatch message.
    fn on_event(&self, event: GatewayEvent);

    /// Called after each heartbeat send with the time until the next one.
    fn on_heartbeat(&self, _time_to_next: Duration) {}
}

/// Sink that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn on_event(&self, _event: GatewayEvent) {}
}

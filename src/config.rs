//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::envelope::WireFormat;

/// Default limit on reconnect attempts per shard before the client gives
/// up.
pub const DEFAULT_MAX_RECONNECT_TRIES: u32 = 10;
/// Default deadline for each connect phase (dial, upgrade, hello, auth).
pub const DEFAULT_CONNECT_PHASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Presence advertised in the identify payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Presence {
    pub status: String,
    #[serde(default)]
    pub afk: bool,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// One activity entry inside a [`Presence`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
}

/// Configuration for a gateway client.
///
/// The connection address names the handshake endpoint; a resume URL
/// handed out at READY overrides it for resuming reconnects.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Authentication token presented in identify and resume payloads.
    pub token: String,
    /// Event-subscription intents bitmask.
    pub intents: u64,
    /// Total number of shards across the whole deployment.
    pub shard_total: u32,
    /// Handshake endpoint host.
    pub host: String,
    /// Handshake endpoint port.
    pub port: u16,
    /// Envelope wire encoding, fixed for the life of each connection.
    pub format: WireFormat,
    /// Presence advertised at identify time.
    pub presence: Option<Presence>,
    /// Reconnect attempts allowed per shard before fatal shutdown.
    pub max_reconnect_tries: u32,
    /// Deadline applied to each connect phase.
    pub connect_phase_timeout: Duration,
}

impl GatewayConfig {
    /// Configuration with library defaults for the given token and host.
    #[must_use]
    pub fn new(token: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: 0,
            shard_total: 1,
            host: host.into(),
            port: 443,
            format: WireFormat::Json,
            presence: None,
            max_reconnect_tries: DEFAULT_MAX_RECONNECT_TRIES,
            connect_phase_timeout: DEFAULT_CONNECT_PHASE_TIMEOUT,
        }
    }

    /// Upgrade-request path advertising protocol version and encoding.
    #[must_use]
    pub fn request_path(&self) -> String {
        format!("/?v=10&encoding={}", self.format.tag())
    }
}

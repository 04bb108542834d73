//! Connection lifecycle states.

use std::fmt;

/// Per-shard connection state.
///
/// Transitions run strictly forward except on error or close, which
/// resets to [`ConnectionState::Disconnected`] ahead of a reconnect.
/// Application messages are accepted and heartbeats sent only in
/// [`ConnectionState::Authenticated`]. Variants are declared in
/// lifecycle order, so the derived ordering compares connect progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Upgrade request sent; waiting for the textual response terminator.
    Upgrading,
    /// Frame decoding active; waiting for the hello message.
    CollectingHello,
    /// Identify or resume sent; waiting for the session to establish.
    SendingIdentify,
    /// Session established; heartbeats running.
    Authenticated,
}

impl ConnectionState {
    /// Whether inbound application payloads may be interpreted in this
    /// state.
    #[must_use]
    pub const fn accepts_payloads(self) -> bool {
        matches!(
            self,
            ConnectionState::CollectingHello
                | ConnectionState::SendingIdentify
                | ConnectionState::Authenticated
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Upgrading => "upgrading",
            ConnectionState::CollectingHello => "collecting-hello",
            ConnectionState::SendingIdentify => "sending-identify",
            ConnectionState::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

//! Close-code taxonomy.
//!
//! The two-byte status code carried in a close frame decides whether the
//! session may be resumed on reconnect. Codes indicating a configuration
//! or credential problem are fatal: retrying them would fail identically,
//! so they exhaust the reconnect budget immediately.

use std::fmt;

/// Gateway close reasons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CloseReason {
    NormalClose,
    UnknownError,
    UnknownOpcode,
    DecodeError,
    NotAuthenticated,
    AuthenticationFailed,
    AlreadyAuthenticated,
    InvalidSequence,
    RateLimited,
    SessionTimedOut,
    InvalidShard,
    ShardingRequired,
    InvalidApiVersion,
    InvalidIntents,
    DisallowedIntents,
    Unknown(u16),
}

impl CloseReason {
    /// Map a wire status code to its reason.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            1000 => CloseReason::NormalClose,
            4000 => CloseReason::UnknownError,
            4001 => CloseReason::UnknownOpcode,
            4002 => CloseReason::DecodeError,
            4003 => CloseReason::NotAuthenticated,
            4004 => CloseReason::AuthenticationFailed,
            4005 => CloseReason::AlreadyAuthenticated,
            4007 => CloseReason::InvalidSequence,
            4008 => CloseReason::RateLimited,
            4009 => CloseReason::SessionTimedOut,
            4010 => CloseReason::InvalidShard,
            4011 => CloseReason::ShardingRequired,
            4012 => CloseReason::InvalidApiVersion,
            4013 => CloseReason::InvalidIntents,
            4014 => CloseReason::DisallowedIntents,
            other => CloseReason::Unknown(other),
        }
    }

    /// Whether reconnecting after this close can possibly succeed.
    #[must_use]
    pub const fn can_reconnect(self) -> bool {
        !matches!(
            self,
            CloseReason::AuthenticationFailed
                | CloseReason::InvalidShard
                | CloseReason::ShardingRequired
                | CloseReason::InvalidApiVersion
                | CloseReason::InvalidIntents
                | CloseReason::DisallowedIntents
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::NormalClose => write!(f, "normal close"),
            CloseReason::UnknownError => write!(f, "unknown error"),
            CloseReason::UnknownOpcode => write!(f, "unknown opcode sent"),
            CloseReason::DecodeError => write!(f, "payload decode error"),
            CloseReason::NotAuthenticated => write!(f, "payload sent before identify"),
            CloseReason::AuthenticationFailed => write!(f, "authentication failed"),
            CloseReason::AlreadyAuthenticated => write!(f, "already identified"),
            CloseReason::InvalidSequence => write!(f, "invalid resume sequence"),
            CloseReason::RateLimited => write!(f, "rate limited"),
            CloseReason::SessionTimedOut => write!(f, "session timed out"),
            CloseReason::InvalidShard => write!(f, "invalid shard"),
            CloseReason::ShardingRequired => write!(f, "sharding required"),
            CloseReason::InvalidApiVersion => write!(f, "invalid api version"),
            CloseReason::InvalidIntents => write!(f, "invalid intents"),
            CloseReason::DisallowedIntents => write!(f, "disallowed intents"),
            CloseReason::Unknown(code) => write!(f, "unknown close code {code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(4000, true)]
    #[case(4004, false)]
    #[case(4009, true)]
    #[case(4010, false)]
    #[case(4011, false)]
    #[case(4014, false)]
    #[case(1000, true)]
    #[case(4242, true)]
    fn fatal_codes_block_reconnection(#[case] code: u16, #[case] reconnectable: bool) {
        assert_eq!(CloseReason::from_code(code).can_reconnect(), reconnectable);
    }
}

//! Crate-level error taxonomy.
//!
//! Transport and protocol failures are recovered locally through the
//! reconnect path; the variants here surface only where a caller must
//! know the terminal outcome (construction failures, exhausted budgets,
//! collection deadlines).

use std::io;

use thiserror::Error;

use crate::{envelope::EnvelopeError, frame::FrameError};

/// Errors surfaced by the gateway client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// Malformed frame header or control payload.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    /// Envelope could not be encoded or decoded.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    /// Transport-level read, write, or connect failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The shard exhausted its reconnect budget.
    #[error("reconnect budget exhausted for shard {0}")]
    ReconnectBudgetExhausted(u32),
    /// Media-session collection did not complete within its deadline.
    #[error("media session collection timed out")]
    MediaSessionTimeout,
    /// The supervisory loop is no longer running.
    #[error("registry is shut down")]
    RegistryClosed,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;

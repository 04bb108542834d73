//! WebSocket frame encoding and decoding.
//!
//! Implements the binary message-framing layer the gateway protocol rides
//! on: a two-byte base header, three payload-length encodings selected by
//! size thresholds, an optional four-byte mask key, and the control
//! opcodes. Only single-frame messages are reassembled; continuation
//! frames decode but are surfaced as ordinary data payloads.

pub mod codec;

pub use codec::{
    DecodedHeader, apply_mask, decode_header, encode_frame, encode_header, read_close_code,
};

use thiserror::Error;

/// Finish bit in byte 0 of a frame header.
pub(crate) const FINISH_BIT: u8 = 1 << 7;
/// Mask bit in byte 1 of a frame header.
pub(crate) const MASK_BIT: u8 = 1 << 7;
/// Largest payload representable inline in the length byte.
pub(crate) const MAX_PAYLOAD_SMALL: u64 = 125;
/// Largest payload representable with the 16-bit extended length.
pub(crate) const MAX_PAYLOAD_LARGE: u64 = 65_535;
/// Length-byte magic selecting the 16-bit extension.
pub(crate) const PAYLOAD_MAGIC_LARGE: u8 = 126;
/// Length-byte magic selecting the 64-bit extension.
pub(crate) const PAYLOAD_MAGIC_HUGE: u8 = 127;

/// Semantic type of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Whether this opcode carries application data rather than control
    /// traffic.
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, Opcode::Continuation | Opcode::Text | Opcode::Binary)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

/// Errors raised while decoding frame headers or payloads.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    /// Byte 0 carried an opcode outside the protocol's defined set.
    #[error("unknown frame opcode {0:#04x}")]
    UnknownOpcode(u8),
    /// A close frame arrived without its two-byte status code.
    #[error("close frame payload shorter than its status code")]
    TruncatedClose,
    /// The declared payload length does not fit in memory on this target.
    #[error("frame payload length {0} exceeds addressable size")]
    PayloadTooLarge(u64),
}

//! Header construction and parsing for the framing layer.
//!
//! The encoder always sets the finish bit and masks client-originated
//! payloads with a random four-byte key; an all-zero key is protocol-legal
//! but defeats the point of masking, so one is never produced here. The
//! decoder accepts both masked and unmasked frames and reports how many
//! bytes the full header occupied so callers can locate the payload.

use bytes::{BufMut, BytesMut};
use rand::Rng;

use super::{
    FINISH_BIT, FrameError, MASK_BIT, MAX_PAYLOAD_LARGE, MAX_PAYLOAD_SMALL, Opcode,
    PAYLOAD_MAGIC_HUGE, PAYLOAD_MAGIC_LARGE,
};

/// Result of parsing a frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedHeader {
    /// Opcode from byte 0 with the finish bit stripped.
    pub opcode: Opcode,
    /// Declared payload length in bytes.
    pub payload_len: usize,
    /// Total header size, including any extended length and mask key.
    pub header_len: usize,
    /// Mask key, present on client-originated frames.
    pub mask: Option<[u8; 4]>,
}

/// Encode a frame header for a payload of `payload_len` bytes.
///
/// Byte 0 carries the finish bit plus `opcode`; the length field uses the
/// smallest of the three encodings (inline for lengths up to 125, a 16-bit
/// big-endian extension up to 65535, a 64-bit extension beyond). When
/// `mask` is supplied the mask bit is set and the key appended.
#[must_use]
pub fn encode_header(payload_len: u64, opcode: Opcode, mask: Option<[u8; 4]>) -> BytesMut {
    let mut header = BytesMut::with_capacity(14);
    header.put_u8(opcode as u8 | FINISH_BIT);
    #[allow(clippy::cast_possible_truncation)]
    if payload_len <= MAX_PAYLOAD_SMALL {
        header.put_u8(payload_len as u8);
    } else if payload_len <= MAX_PAYLOAD_LARGE {
        header.put_u8(PAYLOAD_MAGIC_LARGE);
        header.put_u16(payload_len as u16);
    } else {
        header.put_u8(PAYLOAD_MAGIC_HUGE);
        header.put_u64(payload_len);
    }
    if let Some(key) = mask {
        header[1] |= MASK_BIT;
        header.put_slice(&key);
    }
    header
}

/// Encode a complete client frame: masked header plus masked payload.
///
/// A fresh random mask key is drawn per frame.
#[must_use]
pub fn encode_frame(opcode: Opcode, payload: &[u8]) -> BytesMut {
    let mut rng = rand::thread_rng();
    let mut key: [u8; 4] = rng.r#gen();
    while key == [0, 0, 0, 0] {
        key = rng.r#gen();
    }
    let mut frame = encode_header(payload.len() as u64, opcode, Some(key));
    frame.reserve(payload.len());
    for (i, byte) in payload.iter().enumerate() {
        frame.put_u8(byte ^ key[i % 4]);
    }
    frame
}

/// Parse a frame header from the start of `buf`.
///
/// Returns `Ok(None)` when the buffer is shorter than the header it
/// implies; the caller retries once more bytes arrive.
///
/// # Errors
///
/// Returns [`FrameError::UnknownOpcode`] for undefined opcodes and
/// [`FrameError::PayloadTooLarge`] when the declared length exceeds
/// addressable memory.
pub fn decode_header(buf: &[u8]) -> Result<Option<DecodedHeader>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let opcode = Opcode::try_from(buf[0] & !FINISH_BIT)?;
    let masked = buf[1] & MASK_BIT != 0;
    let length_byte = buf[1] & !MASK_BIT;

    let (payload_len, mut header_len) = match length_byte {
        PAYLOAD_MAGIC_LARGE => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        PAYLOAD_MAGIC_HUGE => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(bytes), 10)
        }
        inline => (u64::from(inline), 2),
    };

    let mask = if masked {
        if buf.len() < header_len + 4 {
            return Ok(None);
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[header_len..header_len + 4]);
        header_len += 4;
        Some(key)
    } else {
        None
    };

    let payload_len =
        usize::try_from(payload_len).map_err(|_| FrameError::PayloadTooLarge(payload_len))?;
    Ok(Some(DecodedHeader {
        opcode,
        payload_len,
        header_len,
        mask,
    }))
}

/// Read the two-byte big-endian status code at the start of a close
/// frame's payload.
///
/// # Errors
///
/// Returns [`FrameError::TruncatedClose`] when the payload is shorter
/// than the status code.
pub fn read_close_code(payload: &[u8]) -> Result<u16, FrameError> {
    if payload.len() < 2 {
        return Err(FrameError::TruncatedClose);
    }
    Ok(u16::from_be_bytes([payload[0], payload[1]]))
}

/// Apply `key` to `payload` in place; masking and unmasking are the same
/// XOR.
pub fn apply_mask(key: [u8; 4], payload: &mut [u8]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

//! Gateway message envelope and its two wire encodings.
//!
//! Every application message is an envelope `{op, d, s, t}`: a numeric
//! operation code, an opaque payload, an optional sequence number, and an
//! optional event name on dispatches. A connection negotiates one of two
//! encodings at connect time and uses it for its whole life: textual JSON
//! or compact self-describing CBOR.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::frame::Opcode;

/// Operation codes carried in the envelope's `op` field.
pub mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const UPDATE_VOICE_STATE: u8 = 4;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Application message envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: u8,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl Envelope {
    /// Build an envelope carrying only an op and a payload.
    #[must_use]
    pub fn new(op: u8, d: Value) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }
}

/// Wire encoding for envelopes, selected at connect time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// Textual JSON, sent in text frames.
    #[default]
    Json,
    /// Compact self-describing binary, sent in binary frames.
    Cbor,
}

impl WireFormat {
    /// Frame opcode used for data frames under this encoding.
    #[must_use]
    pub const fn data_opcode(self) -> Opcode {
        match self {
            WireFormat::Json => Opcode::Text,
            WireFormat::Cbor => Opcode::Binary,
        }
    }

    /// Query-string tag advertised during the upgrade handshake.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            WireFormat::Json => "json",
            WireFormat::Cbor => "cbor",
        }
    }

    /// Serialize an envelope to wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when the payload cannot be represented in
    /// this encoding.
    pub fn encode(self, envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
        match self {
            WireFormat::Json => Ok(serde_json::to_vec(envelope)?),
            WireFormat::Cbor => {
                let mut out = Vec::new();
                ciborium::ser::into_writer(envelope, &mut out)?;
                Ok(out)
            }
        }
    }

    /// Deserialize an envelope from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] for malformed input.
    pub fn decode(self, bytes: &[u8]) -> Result<Envelope, EnvelopeError> {
        match self {
            WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
            WireFormat::Cbor => Ok(ciborium::de::from_reader(bytes)?),
        }
    }
}

/// Errors from envelope serialization or deserialization.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnvelopeError {
    #[error("JSON envelope error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CBOR encode error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),
    #[error("CBOR decode error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case(WireFormat::Json)]
    #[case(WireFormat::Cbor)]
    fn envelope_round_trips(#[case] format: WireFormat) {
        let envelope = Envelope {
            op: op::DISPATCH,
            d: json!({"session_id": "abc", "nested": {"n": 7}}),
            s: Some(42),
            t: Some("READY".to_owned()),
        };
        let bytes = format.encode(&envelope).expect("encode");
        let back = format.decode(&bytes).expect("decode");
        assert_eq!(back, envelope);
    }

    #[test]
    fn missing_optional_fields_default() {
        let envelope = WireFormat::Json
            .decode(br#"{"op":11}"#)
            .expect("decode heartbeat ack");
        assert_eq!(envelope.op, op::HEARTBEAT_ACK);
        assert_eq!(envelope.s, None);
        assert_eq!(envelope.t, None);
        assert!(envelope.d.is_null());
    }

    #[test]
    fn data_opcode_follows_encoding() {
        assert_eq!(WireFormat::Json.data_opcode(), Opcode::Text);
        assert_eq!(WireFormat::Cbor.data_opcode(), Opcode::Binary);
    }
}

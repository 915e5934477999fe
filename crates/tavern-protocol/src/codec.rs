//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The protocol layer doesn't care how frames are encoded, only that
//! something implements [`Codec`]. Tavern ships [`JsonCodec`], which is
//! what browser clients speak.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Envelope, ProtocolError, Response};

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Decodes an inbound [`Envelope`], rejecting an empty type tag.
    fn decode_envelope(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        let envelope: Envelope = self.decode(data)?;
        if envelope.message_type.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "message type must not be empty".into(),
            ));
        }
        Ok(envelope)
    }

    /// Encodes an outbound [`Response`].
    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, ProtocolError> {
        self.encode(response)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ## Example
///
/// ```rust
/// use tavern_protocol::{Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let envelope = codec
///     .decode_envelope(br#"{"type":"leave_room"}"#)
///     .unwrap();
/// assert_eq!(envelope.message_type, "leave_room");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_envelope_garbage_returns_decode_error() {
        let result = JsonCodec.decode_envelope(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_envelope_empty_type_is_invalid() {
        let result = JsonCodec.decode_envelope(br#"{"type":""}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_encode_response_produces_wire_json() {
        let bytes = JsonCodec
            .encode_response(&Response::ok("client_joined", json!({ "clientId": "p2" })))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "client_joined");
        assert_eq!(value["data"]["clientId"], "p2");
    }
}

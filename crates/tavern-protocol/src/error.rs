//! Error types for the protocol layer.
//!
//! Each crate in Tavern defines its own error enum, so a `ProtocolError`
//! always means "these bytes weren't a valid frame", never a networking
//! or room problem.

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, missing required fields,
    /// or wrong field types.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame parsed but violates protocol rules (e.g. an empty type
    /// tag).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

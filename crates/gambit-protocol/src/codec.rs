//! Codec trait and implementations for turning events into frames.
//!
//! The session layer never touches bytes directly: it hands events to a
//! [`Codec`] and gets frames back. [`JsonCodec`] is the only
//! implementation today; the browser client speaks JSON.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to frames and decodes frames back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a frame into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the frame is malformed or names
    /// an unknown event.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ## Example
///
/// ```rust
/// use gambit_protocol::{ClientEvent, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame = codec.encode(&ClientEvent::Resign).unwrap();
/// let decoded: ClientEvent = codec.decode(&frame).unwrap();
/// assert_eq!(decoded, ClientEvent::Resign);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

//! Destination envelope carried inside every frame.
//!
//! The transport moves opaque payloads; the envelope is what the node layer
//! puts in them: the destination actor path plus the serialized user
//! message. Layout is a length-prefixed UTF-8 path followed by the payload
//! bytes, which run to the end of the frame:
//!
//! ```text
//! [path_len: 4 bytes (u32, little-endian)]
//! [path: path_len bytes (UTF-8)]
//! [payload: remaining bytes]
//! ```

use crate::error::EnvelopeError;

/// A routed message: destination actor path plus serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Destination actor path.
    pub path: String,
    /// Serialized user message.
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create an envelope for `path` carrying `payload`.
    pub fn new(path: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            payload,
        }
    }

    /// Serialize to the wire layout.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        if self.path.is_empty() {
            return Err(EnvelopeError::EmptyPath);
        }
        let path = self.path.as_bytes();
        let mut buffer = Vec::with_capacity(4 + path.len() + self.payload.len());
        buffer.extend_from_slice(&(path.len() as u32).to_le_bytes());
        buffer.extend_from_slice(path);
        buffer.extend_from_slice(&self.payload);
        Ok(buffer)
    }

    /// Parse an envelope from a complete frame payload.
    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        if data.len() < 4 {
            return Err(EnvelopeError::Truncated("path length"));
        }
        let mut header = [0u8; 4];
        header.copy_from_slice(&data[..4]);
        let path_len = u32::from_le_bytes(header) as usize;

        if path_len == 0 {
            return Err(EnvelopeError::EmptyPath);
        }
        if data.len() < 4 + path_len {
            return Err(EnvelopeError::Truncated("path"));
        }

        let path = std::str::from_utf8(&data[4..4 + path_len])
            .map_err(|_| EnvelopeError::InvalidPath)?
            .to_string();
        let payload = data[4 + path_len..].to_vec();

        Ok(Self { path, payload })
    }
}

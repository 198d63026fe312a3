//! Length-prefixed wire framing.
//!
//! Every byte stream between workers is a concatenation of frames:
//! a 4-byte big-endian payload length followed by exactly that many payload
//! bytes. No magic, no version, no checksum; the sockets are a local-only
//! trusted channel.
//!
//! Stream reads deliver arbitrary chunks: zero, one, or many frames, with
//! frame boundaries anywhere. [`FrameBuffer`] accumulates chunks and drains
//! complete frames in arrival order, keeping partial trailing bytes for the
//! next read.

use crate::error::TransportError;

/// Bytes in the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest accepted frame payload. A length field above this closes the
/// connection; framing corruption is a bug, not a recoverable condition.
pub const MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;

/// Chunk size requested from the socket by read loops.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix `payload` with its big-endian length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reassembles frames from a chunked byte stream.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the socket.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes currently buffered, including any partial frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame payload, if one is buffered.
    ///
    /// Returns `Ok(None)` when the buffered bytes do not yet hold a complete
    /// frame; the partial bytes stay buffered. Returns an error when the
    /// length field announces a payload larger than [`MAX_FRAME_PAYLOAD`];
    /// the caller must close the connection rather than resync.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.buffer[..FRAME_HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;

        if len > MAX_FRAME_PAYLOAD {
            return Err(TransportError::FrameTooLarge {
                len,
                max: MAX_FRAME_PAYLOAD,
            });
        }
        if self.buffer.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        let payload = self.buffer[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].to_vec();
        self.buffer.drain(..FRAME_HEADER_LEN + len);
        Ok(Some(payload))
    }
}

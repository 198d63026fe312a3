//! Payload serializer seam.
//!
//! The cluster core never interprets user messages; it hands them to a
//! [`Serializer`] on the way out and back in. The default is JSON, any
//! symmetric codec can be plugged in through `Cluster::with_serializer`.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::EnvelopeError;

/// Symmetric codec for user messages.
///
/// Implementations must round-trip: `deserialize(serialize(m))` yields a
/// value equivalent to `m`. The trait is object-safe so one serializer
/// instance can be shared across every worker.
pub trait Serializer<M>: Send + Sync {
    /// Encode a message for the wire.
    fn serialize(&self, message: &M) -> Result<Vec<u8>, EnvelopeError>;

    /// Decode a message received from the wire.
    fn deserialize(&self, bytes: &[u8]) -> Result<M, EnvelopeError>;
}

/// JSON serializer backed by serde.
pub struct JsonSerializer<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> JsonSerializer<M> {
    /// Create a JSON serializer.
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for JsonSerializer<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Serializer<M> for JsonSerializer<M>
where
    M: Serialize + DeserializeOwned,
{
    fn serialize(&self, message: &M) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<M, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

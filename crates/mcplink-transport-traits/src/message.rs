//! The opaque payload transports move.

use bytes::Bytes;
use serde::Serialize;

use crate::error::{TransportError, TransportResult};

/// A single JSON-RPC payload in transit.
///
/// Transports treat the payload as opaque bytes; only the client decodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// The serialized JSON-RPC message or batch
    pub payload: Bytes,
}

impl TransportMessage {
    /// Wrap already-serialized bytes.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Serialize a value to a compact JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SerializationFailed`] if encoding fails.
    pub fn from_json<T: Serialize>(value: &T) -> TransportResult<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self::new(bytes))
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// View the payload as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SerializationFailed`] when the payload is
    /// not valid UTF-8.
    pub fn as_str(&self) -> TransportResult<&str> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))
    }
}

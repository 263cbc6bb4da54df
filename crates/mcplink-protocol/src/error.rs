//! Protocol error types.

use thiserror::Error;

/// A specialized `Result` type for protocol operations.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding, decoding, or classifying messages.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The buffer did not hold a well-formed JSON-RPC message.
    #[error("Invalid JSON-RPC message: {0}")]
    InvalidMessage(String),

    /// A batch buffer held zero elements.
    #[error("Empty JSON-RPC batch")]
    EmptyBatch,

    /// A batch buffer was structurally broken (unbalanced brackets,
    /// unterminated string, trailing garbage).
    #[error("Malformed JSON-RPC batch: {0}")]
    MalformedBatch(String),

    /// Serialization to JSON failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

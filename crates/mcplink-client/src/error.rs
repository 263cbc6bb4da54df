//! Client error types.

use thiserror::Error;

use mcplink_protocol::{JsonRpcError, ProtocolError, RequestId};
use mcplink_transport_traits::TransportError;

/// A specialized `Result` type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the high-level client.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ClientError {
    /// An API was called while the client was not connected.
    #[error("Client is not connected")]
    NotConnected,

    /// `connect()`/`disconnect()` raced an in-flight transition.
    #[error("A connection state transition is already in progress")]
    ConnectionInProgress,

    /// The server never advertised the capability this API needs.
    #[error("Server does not support the '{capability}' capability")]
    CapabilityNotSupported {
        /// The missing capability (`prompts`, `resources.subscribe`, ...)
        capability: String,
    },

    /// The server answered with a JSON-RPC error.
    #[error("Request failed: {error}")]
    RequestFailed {
        /// The error envelope
        error: JsonRpcError,
    },

    /// The response decoded, but not into the expected result shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The per-request timeout elapsed.
    #[error("Request timed out")]
    RequestTimedOut,

    /// The request was cancelled (locally or by the server).
    #[error("Request was cancelled")]
    RequestCancelled,

    /// A response arrived for an id with no pending request.
    #[error("No pending request with id {id}")]
    NoPendingRequest {
        /// The unmatched id
        id: RequestId,
    },

    /// An inbound notification the client does not understand.
    #[error("Unsupported notification '{method}'")]
    UnsupportedNotification {
        /// The unknown method
        method: String,
    },

    /// An inbound server request the client does not serve.
    #[error("Unexpected server request '{method}'")]
    UnexpectedRequestType {
        /// The unknown method
        method: String,
    },

    /// Tool arguments failed the tool's declared input schema.
    #[error("Arguments for tool '{tool}' do not match its input schema")]
    ToolArgumentsInvalid {
        /// The tool
        tool: String,
        /// Validation failures, as rendered messages
        issues: Vec<String>,
    },

    /// Structured tool output failed the tool's declared output schema.
    #[error("Structured content from tool '{tool}' does not match its output schema")]
    ToolOutputInvalid {
        /// The tool
        tool: String,
        /// Validation failures, as rendered messages
        issues: Vec<String>,
    },

    /// A transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

//! Transport error types.

use thiserror::Error;

use mcplink_protocol::JsonRpcError;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
///
/// Both transports share this enum; variants that only one of them can
/// produce (stdio framing, SSE, sessions) are still listed here so the client
/// can match on a single type.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// An operation was attempted before `start()`.
    #[error("Transport not started")]
    NotStarted,

    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to send a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a message.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Failed to serialize or deserialize a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// A protocol-level error occurred.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// An outbound stdio message contained a literal newline byte.
    #[error("Message contains embedded newlines (forbidden by newline-delimited framing)")]
    EmbeddedNewlines,

    /// The inbound stdio buffer exceeded its cap without a line terminator.
    #[error("Receive buffer limit exceeded ({limit} bytes)")]
    BufferLimitExceeded {
        /// The configured cap in bytes
        limit: usize,
    },

    /// The server closed its output stream unexpectedly.
    ///
    /// Carries the trailing stderr text when any was captured, which is
    /// usually the only diagnostic a crashed server leaves behind.
    #[error("Server closed its output stream{}", stderr.as_deref().map(|s| format!(": {s}")).unwrap_or_default())]
    ServerClosedOutputStream {
        /// Most recent stderr output, if any
        stderr: Option<String>,
    },

    /// The configured server URL could not be parsed.
    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),

    /// The HTTP response was structurally unusable.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The HTTP response lacked a Content-Type header.
    #[error("Response is missing a Content-Type header")]
    MissingContentType,

    /// The HTTP response had an unsupported Content-Type.
    #[error("Unsupported Content-Type: {0}")]
    InvalidContentType(String),

    /// The server answered with a non-success HTTP status.
    #[error("Server returned HTTP {status}")]
    ServerHttpError {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
        /// A JSON-RPC error decoded from the body, when present
        rpc_error: Option<JsonRpcError>,
    },

    /// A session id contained bytes outside the visible ASCII range.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// An SSE event had an unrecognized event type.
    #[error("Unexpected SSE event type: {0}")]
    SseInvalidEventType(String),

    /// The legacy `endpoint` event carried an unusable URL.
    #[error("Invalid SSE endpoint: {0}")]
    SseInvalidEndpoint(String),

    /// The server does not support SSE streaming (HTTP 405 on the GET stream).
    #[error("Server does not support SSE streaming")]
    SseNotSupported,

    /// An SSE event arrived at a point where none was expected.
    #[error("Unexpected SSE event: {0}")]
    SseUnexpectedEvent(String),

    /// The persistent SSE stream could not be re-established.
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectionFailed {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// The server demands OAuth authentication (HTTP 401).
    #[error("Authentication required (resource metadata: {resource_metadata_url})")]
    AuthenticationRequired {
        /// Where to fetch protected-resource metadata for the OAuth flow
        resource_metadata_url: String,
        /// Raw `WWW-Authenticate` header, when present
        www_authenticate: Option<String>,
    },

    /// The operation did not complete within the specified timeout.
    #[error("Operation timed out")]
    Timeout,

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

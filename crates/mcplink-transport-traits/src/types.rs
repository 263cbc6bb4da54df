//! Transport state and identification types.

use std::fmt;

/// Which transport an instance is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Child-process stdio, newline-delimited JSON
    Stdio,
    /// Streamable HTTP with optional SSE streams
    StreamableHttp,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => f.write_str("stdio"),
            Self::StreamableHttp => f.write_str("streamable-http"),
        }
    }
}

/// Connection lifecycle of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Not connected (initial and final state)
    #[default]
    Disconnected,
    /// Connection establishment in progress
    Connecting,
    /// Ready to send and receive
    Connected,
    /// Orderly shutdown in progress
    Disconnecting,
    /// Terminal failure
    Failed {
        /// Why the transport failed
        reason: String,
    },
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Disconnecting => f.write_str("disconnecting"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

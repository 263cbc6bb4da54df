//! Transport event types.

use tokio::sync::mpsc;

use crate::error::TransportError;

/// Events a transport reports outside the message stream.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport became ready to carry messages.
    Connected,

    /// The transport lost or closed its connection.
    Disconnected {
        /// An optional reason for the disconnection.
        reason: Option<String>,
    },

    /// A log line produced by the server outside the protocol (stderr for
    /// stdio servers).
    Log {
        /// The log line, without its trailing newline.
        line: String,
    },

    /// An error that cannot be attributed to a single request.
    Error {
        /// The error that occurred.
        error: TransportError,
    },
}

/// An emitter for broadcasting [`TransportEvent`]s to the owning client.
#[derive(Debug, Clone)]
pub struct TransportEventEmitter {
    sender: mpsc::Sender<TransportEvent>,
}

impl TransportEventEmitter {
    /// Creates a new event emitter and a corresponding receiver.
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<TransportEvent>) {
        let (sender, receiver) = mpsc::channel(500);
        (Self { sender }, receiver)
    }

    /// Emits an event, dropping it if the channel is full to avoid blocking.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.sender.try_send(event);
    }

    /// Emits a `Connected` event.
    pub fn emit_connected(&self) {
        self.emit(TransportEvent::Connected);
    }

    /// Emits a `Disconnected` event.
    pub fn emit_disconnected(&self, reason: Option<String>) {
        self.emit(TransportEvent::Disconnected { reason });
    }

    /// Emits a `Log` event.
    pub fn emit_log(&self, line: impl Into<String>) {
        self.emit(TransportEvent::Log { line: line.into() });
    }

    /// Emits an `Error` event.
    pub fn emit_error(&self, error: TransportError) {
        self.emit(TransportEvent::Error { error });
    }
}

//! The transport trait.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use mcplink_protocol::RequestId;
use mcplink_protocol::types::{InitializeParams, InitializeResult};

use crate::error::TransportResult;
use crate::events::TransportEvent;
use crate::message::TransportMessage;
use crate::types::{TransportState, TransportType};

/// Produces fresh JSON-RPC request ids for transport-initiated requests
/// (handshakes, session recovery, keep-alive pings). Supplied by the client
/// so ids never collide with its own.
pub type IdGenerator = Arc<dyn Fn() -> RequestId + Send + Sync>;

/// A bidirectional, ordered carrier of JSON-RPC payloads.
///
/// Implementations serialize all internal mutation behind their own locks or
/// tasks; every method takes `&self` so a transport can be shared behind an
/// `Arc` between the client's sender and reader.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Which transport this is.
    fn transport_type(&self) -> TransportType;

    /// Current connection state.
    async fn state(&self) -> TransportState;

    /// Establish the connection (spawn the process, allocate channels).
    ///
    /// Idempotent: starting a connected transport is a no-op.
    ///
    /// # Errors
    ///
    /// Connection-establishment failures, spawn failures.
    async fn start(&self) -> TransportResult<()>;

    /// Tear the connection down and release resources.
    ///
    /// Idempotent: closing a disconnected transport is a no-op.
    ///
    /// # Errors
    ///
    /// I/O failures during orderly shutdown.
    async fn close(&self) -> TransportResult<()>;

    /// Send one payload. Sends on a single transport are sequenced.
    ///
    /// # Errors
    ///
    /// [`crate::TransportError::NotStarted`] before `start()`, framing and
    /// I/O failures afterwards.
    async fn send(&self, message: TransportMessage) -> TransportResult<()>;

    /// Receive the next inbound payload, in wire order.
    ///
    /// Returns `Ok(None)` when the transport has shut down cleanly and no
    /// further messages will arrive.
    ///
    /// # Errors
    ///
    /// [`crate::TransportError::NotStarted`] before `start()`, receive
    /// failures afterwards.
    async fn receive(&self) -> TransportResult<Option<TransportMessage>>;

    /// Take the event receiver. Yields `Some` exactly once; the caller owns
    /// the lifecycle/log/error event stream from then on.
    async fn take_event_receiver(&self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Run a transport-level `initialize` handshake, when the transport has
    /// one (HTTP needs to capture session headers; stdio does not).
    ///
    /// `Ok(None)` means the transport has no handshake of its own and the
    /// client should perform initialize as an ordinary correlated request.
    ///
    /// # Errors
    ///
    /// Handshake failures, for transports that implement one.
    async fn initialize(
        &self,
        params: InitializeParams,
        id_gen: IdGenerator,
    ) -> TransportResult<Option<InitializeResult>> {
        let _ = (params, id_gen);
        Ok(None)
    }
}

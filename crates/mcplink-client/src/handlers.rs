//! Handlers for server-initiated requests.

use async_trait::async_trait;

use mcplink_protocol::types::{CreateMessageParams, CreateMessageResult};

/// Serves `sampling/createMessage` requests the server sends through the
/// client. The host wires this to its LLM backend; without a handler the
/// client answers `-32601 Sampling not supported`.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Produce a sampled message for the server's request.
    ///
    /// # Errors
    ///
    /// Any failure; it is reported to the server as `-32603 Internal error`
    /// with the description attached as error data.
    async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> Result<CreateMessageResult, Box<dyn std::error::Error + Send + Sync>>;
}

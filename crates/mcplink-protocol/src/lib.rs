//! # MCP Protocol Types
//!
//! JSON-RPC 2.0 envelopes and Model Context Protocol domain types shared by
//! every mcplink transport and the high-level client.
//!
//! The crate is deliberately I/O-free: it knows how to build, classify, and
//! (de)serialize messages, but never touches a socket or a process. Transports
//! hand it byte buffers; the client hands it typed requests.
//!
//! ## Layout
//!
//! - [`jsonrpc`] — request/notification/response/error envelopes and the
//!   inbound message classifier
//! - [`batch`] — raw batch splitting that respects nesting and string escapes
//!   without decoding elements
//! - [`json`] — structural equality and canonical string form for JSON values
//! - [`types`] — MCP domain types (initialize, capabilities, tools, resources,
//!   prompts, sampling, roots, completion, logging)
//! - [`methods`] — the method-name string table

pub mod batch;
pub mod json;
pub mod jsonrpc;
pub mod methods;
pub mod types;

mod error;

pub use error::{ProtocolError, ProtocolResult};
pub use jsonrpc::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcResponsePayload, JsonRpcVersion, ResponseId,
};
pub use types::core::RequestId;

/// Protocol version this client speaks by default.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";

/// Previous protocol revision, used by the HTTP+SSE compatibility fallback.
pub const LEGACY_PROTOCOL_VERSION: &str = "2024-11-05";

/// Header carrying the negotiated protocol version on HTTP requests.
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

/// Header carrying the server-assigned session identifier.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

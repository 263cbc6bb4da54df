//! # Streamable HTTP Transport
//!
//! Client transport for MCP over HTTP: JSON-RPC payloads go out as POSTs,
//! server-initiated traffic comes back over Server-Sent Events. Supports the
//! Streamable HTTP dialect with session management, stream resumability via
//! `Last-Event-ID`, bounded-backoff reconnection, keep-alive pings, and a
//! compatibility fallback to the older HTTP+SSE dialect.
//!
//! Authentication is cooperative: a 401 from the server surfaces as an
//! `AuthenticationRequired` error carrying the resource-metadata URL; the
//! caller runs the OAuth flow (see `mcplink-auth`) and installs the bearer
//! token with [`StreamableHttpTransport::set_authorization_token`].

mod session;
mod sse;
mod transport;

pub use session::{Session, ping_interval_from_keep_alive, validate_session_id};
pub use sse::{DEFAULT_EVENT_TYPE, ServerSentEvent, SseParser};
pub use mcplink_transport_traits::IdGenerator;
pub use transport::StreamableHttpTransport;

//! # MCP Client
//!
//! The high-level client: typed APIs over any [`Transport`], request/response
//! correlation with timeouts and cancellation, capability gating, and
//! handling of the requests a server may send back through the connection.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcplink_client::Client;
//! use mcplink_stdio::{ServerProcessConfig, StdioTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = StdioTransport::new(
//!     ServerProcessConfig::new("my-mcp-server").with_args(["--stdio"]),
//! );
//! let client = Client::new(Arc::new(transport));
//!
//! client.connect().await?;
//! println!("connected to {}", client.server_info().unwrap().name);
//!
//! for tool in client.list_tools(None).await?.tools {
//!     println!("tool: {}", tool.name);
//! }
//!
//! let result = client
//!     .call_tool("echo", Some(serde_json::json!({"msg": "hi"})))
//!     .await?;
//! println!("{result:?}");
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Correlation model
//!
//! Every outbound request gets a fresh integer id and a one-shot channel in
//! the pending map. The transport's receive stream is drained by a reader
//! task that routes responses back through that map; notifications fan out to
//! the public broadcast streams ([`Client::logs`], [`Client::progress`],
//! [`Client::errors`], [`Client::stream_errors`], and per-URI subscription
//! channels). Requests the *server* initiates — `ping`, `roots/list`,
//! `sampling/createMessage` — are answered inline, the latter through a
//! user-supplied [`SamplingHandler`].
//!
//! Every id leaves the pending map in bounded time: by response, timeout
//! (default 120 s, then a best-effort `notifications/cancelled`), caller
//! cancellation, or disconnect.

mod client;
mod error;
mod handlers;

pub use client::{Client, ClientConfig, ConnectionState, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ClientError, ClientResult};
pub use handlers::SamplingHandler;

pub use mcplink_transport_traits::Transport;

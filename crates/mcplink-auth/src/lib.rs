//! # OAuth 2.0 Client
//!
//! The authentication side of the Streamable HTTP transport. When a server
//! answers 401, the transport hands the caller a resource-metadata URL; this
//! crate turns that into a usable bearer token:
//!
//! 1. [`OAuthClient::discover`] — RFC 9728 protected-resource metadata, then
//!    RFC 8414 authorization-server metadata (with synthesized defaults when
//!    the server publishes none);
//! 2. [`OAuthClient::register`] — RFC 7591 dynamic client registration, when
//!    no client id is provisioned;
//! 3. [`PkcePair::generate`] + [`OAuthClient::authorization_url`] — the
//!    browser leg, bound with PKCE S256 and a CSRF `state` parameter;
//! 4. [`OAuthClient::exchange_code`] / [`OAuthClient::refresh`] — token
//!    endpoint calls.
//!
//! Every request carries the `MCP-Protocol-Version` header; the HTTP client
//! is pinned to TLS ≥ 1.2 with no cookie jar and no caching.

mod client;
mod error;
mod pkce;
mod types;

pub use client::OAuthClient;
pub use error::{OAuthError, OAuthResult};
pub use pkce::{AuthorizationState, PkcePair, STATE_VALIDITY};
pub use types::{
    ClientRegistrationRequest, ClientRegistrationResponse, OAuthErrorResponse, OAuthToken,
    ResourceMetadata, ServerMetadata,
};

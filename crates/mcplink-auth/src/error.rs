//! OAuth error types.

use thiserror::Error;

use crate::types::OAuthErrorResponse;

/// A specialized `Result` type for OAuth operations.
pub type OAuthResult<T> = std::result::Result<T, OAuthError>;

/// Errors produced by the OAuth client.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum OAuthError {
    /// A URL could not be parsed or manipulated.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Metadata discovery failed.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The server advertises PKCE methods but not S256.
    #[error("Authorization server does not support the S256 code challenge method")]
    PkceUnsupported,

    /// The `state` parameter returned by the callback did not match.
    #[error("State parameter mismatch")]
    StateMismatch,

    /// The `state` parameter outlived its validity window.
    #[error("State parameter expired")]
    StateExpired,

    /// The token endpoint rejected the request.
    #[error("Token request failed with HTTP {status}")]
    TokenRequestFailed {
        /// HTTP status code
        status: u16,
        /// Decoded OAuth error body, when the server sent one
        error: Option<OAuthErrorResponse>,
    },

    /// The registration endpoint rejected the request.
    #[error("Client registration failed with HTTP {status}")]
    RegistrationFailed {
        /// HTTP status code
        status: u16,
        /// Decoded OAuth error body, when the server sent one
        error: Option<OAuthErrorResponse>,
    },

    /// The server published no registration endpoint.
    #[error("Authorization server has no registration endpoint")]
    NoRegistrationEndpoint,

    /// A network-level failure.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// A body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for OAuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

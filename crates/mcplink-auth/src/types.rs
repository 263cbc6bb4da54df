//! OAuth wire types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// RFC 9728 protected-resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// The protected resource's identifier
    pub resource: String,
    /// Authorization servers that can issue tokens for it
    #[serde(default)]
    pub authorization_servers: Vec<String>,
    /// Scopes the resource understands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
}

/// RFC 8414 authorization-server metadata (the subset this client uses).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMetadata {
    /// Issuer identifier
    pub issuer: String,
    /// Where to send the user's browser
    pub authorization_endpoint: String,
    /// Where to exchange codes and refresh tokens
    pub token_endpoint: String,
    /// RFC 7591 registration endpoint, when offered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// Response types the server supports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,
    /// Grant types the server supports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,
    /// PKCE methods the server supports; absence means "assume S256 works"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,
    /// Scopes the server advertises
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
}

impl ServerMetadata {
    /// Defaults for servers that publish no metadata document: conventional
    /// endpoint paths under the issuer.
    #[must_use]
    pub fn synthesized(issuer: &str) -> Self {
        let issuer = issuer.trim_end_matches('/');
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{issuer}/authorize"),
            token_endpoint: format!("{issuer}/token"),
            registration_endpoint: Some(format!("{issuer}/register")),
            response_types_supported: Some(vec!["code".to_string()]),
            grant_types_supported: Some(vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ]),
            code_challenge_methods_supported: Some(vec!["S256".to_string()]),
            scopes_supported: None,
        }
    }

    /// Whether PKCE S256 is usable: either the server lists it, or it lists
    /// nothing at all.
    pub fn supports_s256(&self) -> bool {
        match &self.code_challenge_methods_supported {
            Some(methods) => methods.iter().any(|m| m == "S256"),
            None => true,
        }
    }
}

/// A token-endpoint success response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// The bearer token
    pub access_token: String,
    /// Token type, normally `Bearer`
    pub token_type: String,
    /// Lifetime in seconds, when bounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Refresh token, when issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scope, when narrower than requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Absolute expiry derived from `expires_in` at receipt time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Stamp `expires_at` from `expires_in`, anchored at `received`.
    pub fn with_expiry_from(mut self, received: DateTime<Utc>) -> Self {
        self.expires_at = self.expires_in.map(|s| received + Duration::seconds(s));
        self
    }

    /// Whether the token is past (or within `leeway` seconds of) expiry.
    pub fn is_expired(&self, leeway_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now() + Duration::seconds(leeway_secs) >= at)
    }
}

/// A token- or registration-endpoint error body (RFC 6749 §5.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Machine-readable error code
    pub error: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// Pointer at documentation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

/// RFC 7591 dynamic client registration request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Redirect URIs the client will use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<String>>,
    /// Human-readable client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Requested scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Grant types the client will use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,
    /// Response types the client will use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,
    /// How the client authenticates at the token endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    /// Software identifier, stable across versions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_id: Option<String>,
    /// Software version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
}

/// RFC 7591 dynamic client registration response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    /// Assigned client id
    pub client_id: String,
    /// Assigned client secret, for confidential clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// When the id was issued (seconds since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id_issued_at: Option<i64>,
    /// When the secret expires (seconds since epoch, 0 = never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret_expires_at: Option<i64>,
}

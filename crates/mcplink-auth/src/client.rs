//! The OAuth client: discovery and wire calls.

use chrono::Utc;
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use mcplink_protocol::{LATEST_PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER};

use crate::error::{OAuthError, OAuthResult};
use crate::pkce::{AuthorizationState, PkcePair};
use crate::types::{
    ClientRegistrationRequest, ClientRegistrationResponse, OAuthErrorResponse, OAuthToken,
    ResourceMetadata, ServerMetadata,
};

/// Network timeout for every OAuth request.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Path of the RFC 8414 authorization-server metadata document.
const AUTH_SERVER_WELL_KNOWN: &str = ".well-known/oauth-authorization-server";

/// OAuth 2.0 client for the authorization-code flow with PKCE.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    protocol_version: String,
}

impl OAuthClient {
    /// Create a client speaking the default protocol version.
    ///
    /// # Errors
    ///
    /// [`OAuthError::Http`] if the underlying HTTP client cannot be built.
    pub fn new() -> OAuthResult<Self> {
        Self::with_protocol_version(LATEST_PROTOCOL_VERSION)
    }

    /// Create a client with an explicit `MCP-Protocol-Version` value.
    ///
    /// # Errors
    ///
    /// [`OAuthError::Http`] if the underlying HTTP client cannot be built.
    pub fn with_protocol_version(version: impl Into<String>) -> OAuthResult<Self> {
        // No cookie jar, no caching semantics; every call is explicit.
        let http = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OAuthError::Http(e.to_string()))?;
        Ok(Self {
            http,
            protocol_version: version.into(),
        })
    }

    /// Discover the authorization server for a protected resource.
    ///
    /// Fetches the resource metadata (RFC 9728) to learn the issuer — or, on
    /// 404, derives the issuer from the metadata URL's origin — then fetches
    /// the issuer's RFC 8414 document. Servers that publish none get
    /// conventional defaults synthesized.
    ///
    /// # Errors
    ///
    /// [`OAuthError::Discovery`] for unusable metadata,
    /// [`OAuthError::Http`] for network failures on the resource fetch.
    pub async fn discover(&self, resource_metadata_url: &str) -> OAuthResult<ServerMetadata> {
        let response = self
            .http
            .get(resource_metadata_url)
            .header(PROTOCOL_VERSION_HEADER, &self.protocol_version)
            .send()
            .await?;

        let issuer = match response.status() {
            StatusCode::NOT_FOUND => {
                let origin = origin_of(resource_metadata_url)?;
                debug!(issuer = %origin, "no resource metadata; deriving issuer from origin");
                origin
            }
            status if status.is_success() => {
                let metadata: ResourceMetadata = response
                    .json()
                    .await
                    .map_err(|e| OAuthError::Decode(e.to_string()))?;
                metadata
                    .authorization_servers
                    .first()
                    .cloned()
                    .ok_or_else(|| {
                        OAuthError::Discovery(
                            "resource metadata lists no authorization servers".to_string(),
                        )
                    })?
            }
            status => {
                return Err(OAuthError::Discovery(format!(
                    "resource metadata fetch returned HTTP {status}"
                )));
            }
        };

        let well_known = format!("{}/{AUTH_SERVER_WELL_KNOWN}", issuer.trim_end_matches('/'));
        match self
            .http
            .get(&well_known)
            .header(PROTOCOL_VERSION_HEADER, &self.protocol_version)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response
                .json()
                .await
                .map_err(|e| OAuthError::Decode(e.to_string())),
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                debug!(issuer = %issuer, "no authorization-server metadata; synthesizing defaults");
                Ok(ServerMetadata::synthesized(&issuer))
            }
            Ok(response) => Err(OAuthError::Discovery(format!(
                "authorization-server metadata fetch returned HTTP {}",
                response.status()
            ))),
            Err(e) => {
                warn!(error = %e, issuer = %issuer, "metadata fetch failed; synthesizing defaults");
                Ok(ServerMetadata::synthesized(&issuer))
            }
        }
    }

    /// Build the URL to open in the user's browser.
    ///
    /// # Errors
    ///
    /// [`OAuthError::PkceUnsupported`] when the server's advertised challenge
    /// methods exclude S256, [`OAuthError::InvalidUrl`] for a broken
    /// authorization endpoint.
    pub fn authorization_url(
        &self,
        metadata: &ServerMetadata,
        client_id: &str,
        redirect_uri: &str,
        pkce: &PkcePair,
        state: &AuthorizationState,
        resource: Option<&str>,
        scope: Option<&str>,
    ) -> OAuthResult<Url> {
        if !metadata.supports_s256() {
            return Err(OAuthError::PkceUnsupported);
        }

        let mut url = Url::parse(&metadata.authorization_endpoint)
            .map_err(|e| OAuthError::InvalidUrl(format!("{}: {e}", metadata.authorization_endpoint)))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", PkcePair::method())
                .append_pair("state", state.value());
            if let Some(resource) = resource {
                query.append_pair("resource", resource);
            }
            if let Some(scope) = scope {
                query.append_pair("scope", scope);
            }
        }
        Ok(url)
    }

    /// Exchange an authorization code for a token.
    ///
    /// # Errors
    ///
    /// [`OAuthError::TokenRequestFailed`] with the decoded error body when
    /// the server refuses, [`OAuthError::Http`]/[`OAuthError::Decode`]
    /// otherwise.
    pub async fn exchange_code(
        &self,
        metadata: &ServerMetadata,
        client_id: &str,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        resource: Option<&str>,
    ) -> OAuthResult<OAuthToken> {
        let mut pairs = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
            ("code_verifier", code_verifier),
        ];
        if let Some(resource) = resource {
            pairs.push(("resource", resource));
        }
        self.token_request(&metadata.token_endpoint, &pairs).await
    }

    /// Redeem a refresh token.
    ///
    /// # Errors
    ///
    /// Same as [`OAuthClient::exchange_code`].
    pub async fn refresh(
        &self,
        metadata: &ServerMetadata,
        client_id: &str,
        refresh_token: &str,
        resource: Option<&str>,
    ) -> OAuthResult<OAuthToken> {
        let mut pairs = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
        ];
        if let Some(resource) = resource {
            pairs.push(("resource", resource));
        }
        self.token_request(&metadata.token_endpoint, &pairs).await
    }

    /// Dynamically register this client (RFC 7591).
    ///
    /// # Errors
    ///
    /// [`OAuthError::NoRegistrationEndpoint`] when the server offers none,
    /// [`OAuthError::RegistrationFailed`] for any non-201 answer.
    pub async fn register(
        &self,
        metadata: &ServerMetadata,
        request: &ClientRegistrationRequest,
    ) -> OAuthResult<ClientRegistrationResponse> {
        let endpoint = metadata
            .registration_endpoint
            .as_deref()
            .ok_or(OAuthError::NoRegistrationEndpoint)?;

        let response = self
            .http
            .post(endpoint)
            .header(PROTOCOL_VERSION_HEADER, &self.protocol_version)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CREATED {
            response
                .json()
                .await
                .map_err(|e| OAuthError::Decode(e.to_string()))
        } else {
            let error = response.json::<OAuthErrorResponse>().await.ok();
            Err(OAuthError::RegistrationFailed {
                status: status.as_u16(),
                error,
            })
        }
    }

    async fn token_request(
        &self,
        endpoint: &str,
        pairs: &[(&str, &str)],
    ) -> OAuthResult<OAuthToken> {
        let response = self
            .http
            .post(endpoint)
            .header(PROTOCOL_VERSION_HEADER, &self.protocol_version)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(form_body(pairs))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let token: OAuthToken = response
                .json()
                .await
                .map_err(|e| OAuthError::Decode(e.to_string()))?;
            Ok(token.with_expiry_from(Utc::now()))
        } else {
            let error = response.json::<OAuthErrorResponse>().await.ok();
            Err(OAuthError::TokenRequestFailed {
                status: status.as_u16(),
                error,
            })
        }
    }
}

/// `scheme://host[:port]` of a URL, with path, query, and fragment stripped.
fn origin_of(url: &str) -> OAuthResult<String> {
    let parsed = Url::parse(url).map_err(|e| OAuthError::InvalidUrl(format!("{url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| OAuthError::InvalidUrl(format!("{url}: no host")))?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    })
}

/// Percent-encode pairs into an `application/x-www-form-urlencoded` body.
fn form_body(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn origin_strips_path_query_and_fragment() {
        assert_eq!(
            origin_of("https://mcp.example.com/server/.well-known/x?a=1#frag").unwrap(),
            "https://mcp.example.com"
        );
        assert_eq!(
            origin_of("http://localhost:8080/resource").unwrap(),
            "http://localhost:8080"
        );
    }

    #[test]
    fn form_body_percent_encodes_values() {
        let body = form_body(&[("a", "x y"), ("b", "c&d=e")]);
        assert_eq!(body, "a=x%20y&b=c%26d%3De");
    }

    #[test]
    fn authorization_url_carries_all_parameters() {
        let client = OAuthClient::new().unwrap();
        let metadata = ServerMetadata::synthesized("https://auth.example.com");
        let pkce = PkcePair::generate();
        let state = AuthorizationState::generate();

        let url = client
            .authorization_url(
                &metadata,
                "client-1",
                "app://oauth/callback",
                &pkce,
                &state,
                Some("https://mcp.example.com"),
                None,
            )
            .unwrap();

        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["redirect_uri"], "app://oauth/callback");
        assert_eq!(query["code_challenge"], pkce.challenge);
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["state"], state.value());
        assert_eq!(query["resource"], "https://mcp.example.com");
        assert!(!query.contains_key("scope"));
    }

    #[test]
    fn authorization_url_refuses_servers_without_s256() {
        let client = OAuthClient::new().unwrap();
        let mut metadata = ServerMetadata::synthesized("https://auth.example.com");
        metadata.code_challenge_methods_supported = Some(vec!["plain".to_string()]);

        let result = client.authorization_url(
            &metadata,
            "client-1",
            "app://cb",
            &PkcePair::generate(),
            &AuthorizationState::generate(),
            None,
            None,
        );
        assert!(matches!(result, Err(OAuthError::PkceUnsupported)));
    }
}

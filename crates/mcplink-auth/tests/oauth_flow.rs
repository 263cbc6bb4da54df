//! Wire-level tests for discovery, token exchange, and registration.

use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcplink_auth::{
    ClientRegistrationRequest, OAuthClient, OAuthError,
};

#[tokio::test]
async fn discovery_follows_resource_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-protected-resource"))
        .and(header("MCP-Protocol-Version", "2025-03-26"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resource": server.uri(),
            "authorization_servers": [server.uri()],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/oauth/authorize", server.uri()),
            "token_endpoint": format!("{}/oauth/token", server.uri()),
            "registration_endpoint": format!("{}/oauth/register", server.uri()),
            "code_challenge_methods_supported": ["S256"],
        })))
        .mount(&server)
        .await;

    let client = OAuthClient::new().unwrap();
    let metadata = client
        .discover(&format!("{}/.well-known/oauth-protected-resource", server.uri()))
        .await
        .unwrap();

    assert_eq!(metadata.issuer, server.uri());
    assert!(metadata.authorization_endpoint.ends_with("/oauth/authorize"));
    assert!(metadata.token_endpoint.ends_with("/oauth/token"));
    assert!(metadata.supports_s256());
}

#[tokio::test]
async fn discovery_synthesizes_defaults_when_documents_missing() {
    let server = MockServer::start().await;

    // Both well-known documents 404: issuer falls back to the origin and the
    // endpoints to conventional paths.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = OAuthClient::new().unwrap();
    let metadata = client
        .discover(&format!(
            "{}/nested/path/.well-known/oauth-protected-resource?x=1",
            server.uri()
        ))
        .await
        .unwrap();

    assert_eq!(metadata.issuer, server.uri());
    assert_eq!(metadata.authorization_endpoint, format!("{}/authorize", server.uri()));
    assert_eq!(metadata.token_endpoint, format!("{}/token", server.uri()));
    assert_eq!(
        metadata.registration_endpoint,
        Some(format!("{}/register", server.uri()))
    );
}

#[tokio::test]
async fn code_exchange_returns_token_with_derived_expiry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code_verifier=verif"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "rt-1",
            "scope": "mcp",
        })))
        .mount(&server)
        .await;

    let client = OAuthClient::new().unwrap();
    let metadata = mcplink_auth::ServerMetadata::synthesized(&server.uri());

    let token = client
        .exchange_code(&metadata, "client-1", "code-1", "app://cb", "verif", None)
        .await
        .unwrap();

    assert_eq!(token.access_token, "at-1");
    assert_eq!(token.refresh_token.as_deref(), Some("rt-1"));
    assert!(token.expires_at.is_some());
    assert!(!token.is_expired(0));
}

#[tokio::test]
async fn token_errors_are_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "authorization code expired",
        })))
        .mount(&server)
        .await;

    let client = OAuthClient::new().unwrap();
    let metadata = mcplink_auth::ServerMetadata::synthesized(&server.uri());

    let result = client
        .exchange_code(&metadata, "client-1", "stale", "app://cb", "v", None)
        .await;

    match result {
        Err(OAuthError::TokenRequestFailed { status, error }) => {
            assert_eq!(status, 400);
            let error = error.unwrap();
            assert_eq!(error.error, "invalid_grant");
            assert_eq!(
                error.error_description.as_deref(),
                Some("authorization code expired")
            );
        }
        other => panic!("expected token failure, got {other:?}"),
    }
}

#[tokio::test]
async fn refresh_uses_refresh_grant() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-2",
            "token_type": "Bearer",
        })))
        .mount(&server)
        .await;

    let client = OAuthClient::new().unwrap();
    let metadata = mcplink_auth::ServerMetadata::synthesized(&server.uri());

    let token = client
        .refresh(&metadata, "client-1", "rt-1", None)
        .await
        .unwrap();
    assert_eq!(token.access_token, "at-2");
    assert!(token.expires_at.is_none());
}

#[tokio::test]
async fn registration_expects_201() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "client_id": "generated-id",
            "client_secret": "generated-secret",
            "client_id_issued_at": 1735689600,
        })))
        .mount(&server)
        .await;

    let client = OAuthClient::new().unwrap();
    let metadata = mcplink_auth::ServerMetadata::synthesized(&server.uri());

    let response = client
        .register(
            &metadata,
            &ClientRegistrationRequest {
                redirect_uris: Some(vec!["app://oauth/callback".to_string()]),
                client_name: Some("mcplink".to_string()),
                grant_types: Some(vec![
                    "authorization_code".to_string(),
                    "refresh_token".to_string(),
                ]),
                response_types: Some(vec!["code".to_string()]),
                token_endpoint_auth_method: Some("none".to_string()),
                ..ClientRegistrationRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.client_id, "generated-id");
    assert_eq!(response.client_secret.as_deref(), Some("generated-secret"));
}

#[tokio::test]
async fn registration_400_is_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_redirect_uri",
        })))
        .mount(&server)
        .await;

    let client = OAuthClient::new().unwrap();
    let metadata = mcplink_auth::ServerMetadata::synthesized(&server.uri());

    let result = client
        .register(&metadata, &ClientRegistrationRequest::default())
        .await;
    match result {
        Err(OAuthError::RegistrationFailed { status, error }) => {
            assert_eq!(status, 400);
            assert_eq!(error.unwrap().error, "invalid_redirect_uri");
        }
        other => panic!("expected registration failure, got {other:?}"),
    }
}

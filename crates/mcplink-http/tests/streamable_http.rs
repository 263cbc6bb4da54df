//! Wire-level tests for the Streamable HTTP transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcplink_http::{IdGenerator, StreamableHttpTransport};
use mcplink_protocol::types::{ClientCapabilities, Implementation, InitializeParams};
use mcplink_protocol::{LATEST_PROTOCOL_VERSION, RequestId};
use mcplink_transport_traits::{Transport, TransportError, TransportMessage};

fn init_params() -> InitializeParams {
    InitializeParams {
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: "mcplink-tests".to_string(),
            version: "0.0.0".to_string(),
        },
    }
}

fn counting_id_gen() -> IdGenerator {
    let counter = Arc::new(AtomicI64::new(0));
    Arc::new(move || RequestId::Number(counter.fetch_add(1, Ordering::SeqCst)))
}

fn initialize_result_body(id: i64) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","id":{id},"result":{{"protocolVersion":"2025-03-26","capabilities":{{"tools":{{}}}},"serverInfo":{{"name":"wire-server","version":"1.2.3"}}}}}}"#
    )
}

async fn mount_initialized_ack(server: &MockServer) {
    Mock::given(method("POST"))
        .and(body_string_contains("notifications/initialized"))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}

async fn mount_get_sse_not_supported(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(405))
        .mount(server)
        .await;
}

#[tokio::test]
async fn initialize_captures_session_id_and_version() {
    let server = MockServer::start().await;

    mount_initialized_ack(&server).await;
    mount_get_sse_not_supported(&server).await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"initialize\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Mcp-Session-Id", "session-abc")
                .set_body_raw(initialize_result_body(0), "application/json"),
        )
        .mount(&server)
        .await;

    let transport = StreamableHttpTransport::new(&server.uri()).unwrap();
    transport.start().await.unwrap();

    let result = transport
        .initialize(init_params(), counting_id_gen())
        .await
        .unwrap();

    assert_eq!(result.server_info.name, "wire-server");
    assert_eq!(result.protocol_version, "2025-03-26");
    assert_eq!(transport.session_id().as_deref(), Some("session-abc"));

    transport.close().await.unwrap();
}

#[tokio::test]
async fn initialize_before_start_is_not_started() {
    let transport = StreamableHttpTransport::new("http://127.0.0.1:9/").unwrap();
    let result = transport.initialize(init_params(), counting_id_gen()).await;
    assert!(matches!(result, Err(TransportError::NotStarted)));
}

#[tokio::test]
async fn session_expiry_reinitializes_and_retries_exactly_once() {
    let server = MockServer::start().await;

    mount_initialized_ack(&server).await;
    mount_get_sse_not_supported(&server).await;

    // First initialize hands out "abc", the recovery initialize hands "def".
    Mock::given(method("POST"))
        .and(body_string_contains("\"initialize\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Mcp-Session-Id", "abc")
                .set_body_raw(initialize_result_body(0), "application/json"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("\"initialize\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Mcp-Session-Id", "def")
                .set_body_raw(initialize_result_body(2), "application/json"),
        )
        .mount(&server)
        .await;

    // The stale session gets one 404, then the retry succeeds.
    Mock::given(method("POST"))
        .and(body_string_contains("tools/list"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    let list_ok = Mock::given(method("POST"))
        .and(body_string_contains("tools/list"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#,
            "application/json",
        ))
        .expect(1)
        .named("tools/list retry")
        .mount_as_scoped(&server)
        .await;

    let transport = StreamableHttpTransport::new(&server.uri()).unwrap();
    transport.start().await.unwrap();
    transport
        .initialize(init_params(), counting_id_gen())
        .await
        .unwrap();
    assert_eq!(transport.session_id().as_deref(), Some("abc"));

    let list_request =
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#;
    transport
        .send(TransportMessage::new(list_request))
        .await
        .unwrap();

    // The retried send's response comes back on the receive stream.
    let received = transport.receive().await.unwrap().unwrap();
    assert!(received.as_str().unwrap().contains("\"tools\""));

    // Recovery replaced the session id.
    assert_eq!(transport.session_id().as_deref(), Some("def"));

    drop(list_ok); // verifies expect(1): exactly two tools/list POSTs hit the wire
    transport.close().await.unwrap();
}

#[tokio::test]
async fn unauthorized_surfaces_authentication_required() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            r#"Bearer realm="mcp", resource="https://auth.example.com/.well-known/oauth-protected-resource""#,
        ))
        .mount(&server)
        .await;

    let transport = StreamableHttpTransport::new(&server.uri()).unwrap();
    transport.start().await.unwrap();

    let result = transport
        .send(TransportMessage::new(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
        ))
        .await;

    match result {
        Err(TransportError::AuthenticationRequired {
            resource_metadata_url,
            www_authenticate,
        }) => {
            assert_eq!(
                resource_metadata_url,
                "https://auth.example.com/.well-known/oauth-protected-resource"
            );
            assert!(www_authenticate.unwrap().starts_with("Bearer"));
        }
        other => panic!("expected authentication-required, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_without_header_synthesizes_metadata_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let transport = StreamableHttpTransport::new(&server.uri()).unwrap();
    transport.start().await.unwrap();

    let result = transport
        .send(TransportMessage::new(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        ))
        .await;

    match result {
        Err(TransportError::AuthenticationRequired {
            resource_metadata_url,
            ..
        }) => {
            assert!(resource_metadata_url.ends_with("/.well-known/mcp-resource"));
            assert!(resource_metadata_url.starts_with("http://"));
        }
        other => panic!("expected authentication-required, got {other:?}"),
    }
}

#[tokio::test]
async fn sse_stream_routes_messages_inbound() {
    let server = MockServer::start().await;

    mount_initialized_ack(&server).await;

    let notification =
        r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#;
    // One stream delivering a single event, then SSE gets disabled so the
    // reconnect loop stops cleanly.
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_raw(
                    format!("id: e1\ndata: {notification}\n\n"),
                    "text/event-stream",
                ),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // The reconnect after the stream drops must resume from the last event.
    let resumed = Mock::given(method("GET"))
        .and(wiremock::matchers::header("Last-Event-ID", "e1"))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .named("resumed GET carries Last-Event-ID")
        .mount_as_scoped(&server)
        .await;
    mount_get_sse_not_supported(&server).await;

    Mock::given(method("POST"))
        .and(body_string_contains("\"initialize\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(initialize_result_body(0), "application/json"),
        )
        .mount(&server)
        .await;

    let transport = StreamableHttpTransport::new(&server.uri()).unwrap();
    transport.start().await.unwrap();
    transport
        .initialize(init_params(), counting_id_gen())
        .await
        .unwrap();

    let received = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        transport.receive(),
    )
    .await
    .expect("timed out waiting for SSE message")
    .unwrap()
    .unwrap();
    assert_eq!(received.as_str().unwrap(), notification);

    // Wait for the reconnect (≈2 s backoff) to hit the resumption mock.
    tokio::time::sleep(std::time::Duration::from_secs(4)).await;
    drop(resumed);
    transport.close().await.unwrap();
}

#[tokio::test]
async fn legacy_fallback_uses_endpoint_event() {
    let server = MockServer::start().await;

    // The modern initialize POST is rejected, triggering the fallback.
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains("\"initialize\""))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    // The GET stream announces where to POST.
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/event-stream")
                .set_body_raw(
                    "event: endpoint\ndata: /messages\n\n",
                    "text/event-stream",
                ),
        )
        .mount(&server)
        .await;

    let init_on_endpoint = Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_string_contains("\"initialize\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(initialize_result_body(0), "application/json"),
        )
        .expect(1)
        .named("initialize on legacy endpoint")
        .mount_as_scoped(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_string_contains("notifications/initialized"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let transport = StreamableHttpTransport::new(&server.uri()).unwrap();
    transport.start().await.unwrap();

    let result = transport
        .initialize(init_params(), counting_id_gen())
        .await
        .unwrap();
    assert_eq!(result.server_info.name, "wire-server");

    drop(init_on_endpoint);
    transport.close().await.unwrap();
}

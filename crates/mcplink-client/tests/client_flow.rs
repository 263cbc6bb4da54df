//! Client behavior tests over an in-memory scripted transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex as TokioMutex, mpsc};

use mcplink_client::{Client, ClientConfig, ClientError};
use mcplink_protocol::types::Root;
use mcplink_transport_traits::{
    Transport, TransportError, TransportEvent, TransportEventEmitter, TransportMessage,
    TransportResult, TransportState, TransportType,
};

const WAIT: Duration = Duration::from_secs(5);

/// A transport whose other end is the test: outbound messages are recorded
/// and handed to a scripted responder, inbound messages are injected.
struct MockTransport {
    started: AtomicBool,
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<TransportMessage>>>,
    event_receiver: TokioMutex<Option<mpsc::Receiver<TransportEvent>>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    async fn state(&self) -> TransportState {
        if self.started.load(Ordering::SeqCst) {
            TransportState::Connected
        } else {
            TransportState::Disconnected
        }
    }

    async fn start(&self) -> TransportResult<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        let text = message.as_str()?.to_string();
        self.outbound_tx
            .send(text)
            .map_err(|_| TransportError::SendFailed("test closed".to_string()))
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut rx = self.inbound_rx.lock().await;
        let Some(rx) = rx.as_mut() else {
            return Err(TransportError::NotStarted);
        };
        Ok(rx.recv().await)
    }

    async fn take_event_receiver(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_receiver.lock().await.take()
    }
}

/// Test-side view of the transport.
struct Harness {
    client: Client,
    /// Everything the client sent, in order.
    sent: Arc<StdMutex<Vec<Value>>>,
    /// Inject inbound wire payloads.
    inject: mpsc::UnboundedSender<TransportMessage>,
    #[allow(dead_code)]
    events: TransportEventEmitter,
}

impl Harness {
    /// Build a client over a responder that answers each outbound request.
    /// The responder gets every sent message (requests and notifications)
    /// and returns payloads to inject back.
    fn new(
        config: ClientConfig,
        responder: impl FnMut(&Value) -> Vec<Value> + Send + 'static,
    ) -> Self {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inject, inbound_rx) = mpsc::unbounded_channel::<TransportMessage>();
        let (events, event_receiver) = TransportEventEmitter::new();

        let transport = Arc::new(MockTransport {
            started: AtomicBool::new(false),
            outbound_tx,
            inbound_rx: TokioMutex::new(Some(inbound_rx)),
            event_receiver: TokioMutex::new(Some(event_receiver)),
        });

        let sent = Arc::new(StdMutex::new(Vec::new()));
        {
            let sent = Arc::clone(&sent);
            let inject = inject.clone();
            let mut responder = responder;
            tokio::spawn(async move {
                while let Some(text) = outbound_rx.recv().await {
                    let value: Value = serde_json::from_str(&text).expect("client sent JSON");
                    sent.lock().unwrap().push(value.clone());
                    for reply in responder(&value) {
                        let _ = inject.send(TransportMessage::new(reply.to_string()));
                    }
                }
            });
        }

        Self {
            client: Client::with_config(transport, config),
            sent,
            inject,
            events,
        }
    }

    fn sent_snapshot(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until a sent message satisfies `predicate`.
    async fn wait_for_sent(&self, predicate: impl Fn(&Value) -> bool) -> Value {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(found) = self.sent_snapshot().iter().find(|m| predicate(m)) {
                    return found.clone();
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("message never sent")
    }

    fn inject(&self, payload: Value) {
        self.inject
            .send(TransportMessage::new(payload.to_string()))
            .expect("client receive side closed");
    }
}

/// The standard responder: answers initialize with the given capabilities
/// and dispatches other methods through `extra`.
fn responder_with(
    capabilities: Value,
    mut extra: impl FnMut(&str, &Value) -> Option<Value> + Send + 'static,
) -> impl FnMut(&Value) -> Vec<Value> + Send + 'static {
    move |message| {
        let method = message.get("method").and_then(Value::as_str);
        let id = message.get("id").cloned();
        match (method, id) {
            (Some("initialize"), Some(id)) => vec![json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": capabilities,
                    "serverInfo": {"name": "s", "version": "1.0.0"}
                }
            })],
            (Some(method), Some(id)) => match extra(method, message) {
                Some(result) => vec![json!({"jsonrpc": "2.0", "id": id, "result": result})],
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

fn all_caps() -> Value {
    json!({
        "prompts": {"listChanged": true},
        "resources": {"subscribe": true, "listChanged": true},
        "tools": {"listChanged": true},
        "completions": {}
    })
}

#[tokio::test]
async fn connect_runs_the_handshake_in_order() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({"tools": {}}), |_, _| None),
    );

    tokio::time::timeout(WAIT, harness.client.connect())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(harness.client.server_info().unwrap().name, "s");

    // The recorder runs on its own task; wait for the notification to land
    // before asserting on ordering.
    harness
        .wait_for_sent(|m| m["method"] == "notifications/initialized")
        .await;
    let sent = harness.sent_snapshot();
    assert_eq!(sent[0]["method"], "initialize");
    assert_eq!(sent[0]["params"]["protocolVersion"], "2025-03-26");
    assert_eq!(sent[0]["params"]["clientInfo"]["name"], "mcplink");
    // The very next message on the wire is the initialized notification.
    assert_eq!(sent[1]["method"], "notifications/initialized");
    assert!(sent[1].get("id").is_none());

    harness.client.disconnect().await.unwrap();
}

#[tokio::test]
async fn connect_is_idempotent_when_connected() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({}), |_, _| None),
    );
    harness.client.connect().await.unwrap();
    harness.client.connect().await.unwrap();
    assert_eq!(harness.sent_snapshot().iter().filter(|m| m["method"] == "initialize").count(), 1);
}

#[tokio::test]
async fn apis_before_connect_are_not_connected() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({}), |_, _| None),
    );
    let result = harness.client.list_tools(None).await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn missing_capability_is_rejected_locally() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({"tools": {}}), |method, _| match method {
            "ping" => Some(json!({})),
            _ => None,
        }),
    );
    harness.client.connect().await.unwrap();

    let result = harness.client.list_prompts(None).await;
    match result {
        Err(ClientError::CapabilityNotSupported { capability }) => {
            assert_eq!(capability, "prompts");
        }
        other => panic!("expected capability error, got {other:?}"),
    }
    // Nothing went to the wire for the gated call.
    assert!(
        !harness
            .sent_snapshot()
            .iter()
            .any(|m| m["method"] == "prompts/list")
    );

    // ping is never gated
    harness.client.ping().await.unwrap();
}

#[tokio::test]
async fn timeout_sends_cancellation_notification() {
    let config = ClientConfig {
        request_timeout: Duration::from_millis(100),
        ..ClientConfig::default()
    };
    // resources/list is never answered.
    let harness = Harness::new(
        config,
        responder_with(all_caps(), |_, _| None),
    );
    harness.client.connect().await.unwrap();

    let result = harness.client.list_resources(None).await;
    assert!(matches!(result, Err(ClientError::RequestTimedOut)));

    let request = harness
        .wait_for_sent(|m| m["method"] == "resources/list")
        .await;
    let cancelled = harness
        .wait_for_sent(|m| m["method"] == "notifications/cancelled")
        .await;
    assert_eq!(cancelled["params"]["requestId"], request["id"]);

    // A late response for that id is not routed anywhere (no pending entry).
    harness.inject(json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": {"resources": []}
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn dropping_a_request_future_cancels_it() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(all_caps(), |_, _| None),
    );
    harness.client.connect().await.unwrap();

    let client = &harness.client;
    {
        let call = client.list_resources(None);
        tokio::pin!(call);
        // Poll once so the request hits the wire, then drop the future.
        let _ = futures::poll!(call.as_mut());
    }

    harness
        .wait_for_sent(|m| m["method"] == "notifications/cancelled")
        .await;
}

#[tokio::test]
async fn server_ping_gets_an_empty_result() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({}), |_, _| None),
    );
    harness.client.connect().await.unwrap();

    harness.inject(json!({"jsonrpc": "2.0", "id": "srv-ping", "method": "ping"}));

    let reply = harness
        .wait_for_sent(|m| m["id"] == "srv-ping" && m.get("result").is_some())
        .await;
    assert_eq!(reply["result"], json!({}));
}

#[tokio::test]
async fn server_roots_list_gets_configured_roots() {
    let config = ClientConfig {
        roots: vec![Root {
            uri: "file:///workspace".to_string(),
            name: Some("workspace".to_string()),
        }],
        ..ClientConfig::default()
    };
    let harness = Harness::new(config, responder_with(json!({}), |_, _| None));
    harness.client.connect().await.unwrap();

    harness.inject(json!({"jsonrpc": "2.0", "id": 900, "method": "roots/list"}));

    let reply = harness
        .wait_for_sent(|m| m["id"] == 900 && m.get("result").is_some())
        .await;
    assert_eq!(reply["result"]["roots"][0]["uri"], "file:///workspace");
}

#[tokio::test]
async fn sampling_without_handler_is_method_not_found() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({}), |_, _| None),
    );
    harness.client.connect().await.unwrap();

    harness.inject(json!({
        "jsonrpc": "2.0",
        "id": 901,
        "method": "sampling/createMessage",
        "params": {"messages": [], "maxTokens": 10}
    }));

    let reply = harness
        .wait_for_sent(|m| m["id"] == 901 && m.get("error").is_some())
        .await;
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["error"]["message"], "Sampling not supported");
}

#[tokio::test]
async fn set_roots_announces_when_connected() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({}), |_, _| None),
    );

    // Before connect: stored silently.
    harness
        .client
        .set_roots(vec![Root {
            uri: "file:///a".to_string(),
            name: None,
        }])
        .await
        .unwrap();
    assert!(harness.sent_snapshot().is_empty());

    harness.client.connect().await.unwrap();
    harness
        .client
        .set_roots(vec![Root {
            uri: "file:///b".to_string(),
            name: None,
        }])
        .await
        .unwrap();
    harness
        .wait_for_sent(|m| m["method"] == "notifications/roots/list_changed")
        .await;
}

#[tokio::test]
async fn log_notifications_reach_the_logs_stream() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({}), |_, _| None),
    );
    harness.client.connect().await.unwrap();
    let mut logs = harness.client.logs();

    harness.inject(json!({
        "jsonrpc": "2.0",
        "method": "notifications/message",
        "params": {"level": "warning", "logger": "db", "data": "slow query"}
    }));

    let entry = tokio::time::timeout(WAIT, logs.recv()).await.unwrap().unwrap();
    assert_eq!(entry.logger.as_deref(), Some("db"));
    assert_eq!(entry.data, json!("slow query"));
}

#[tokio::test]
async fn unknown_notifications_land_on_stream_errors() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({}), |_, _| None),
    );
    harness.client.connect().await.unwrap();
    let mut stream_errors = harness.client.stream_errors();

    harness.inject(json!({
        "jsonrpc": "2.0",
        "method": "notifications/did_you_mean",
        "params": {}
    }));

    let error = tokio::time::timeout(WAIT, stream_errors.recv())
        .await
        .unwrap()
        .unwrap();
    match error {
        ClientError::UnsupportedNotification { method } => {
            assert_eq!(method, "notifications/did_you_mean");
        }
        other => panic!("expected unsupported-notification, got {other:?}"),
    }
}

#[tokio::test]
async fn error_envelopes_without_id_reach_the_errors_stream() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(json!({}), |_, _| None),
    );
    harness.client.connect().await.unwrap();
    let mut errors = harness.client.errors();

    harness.inject(json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": {"code": -32700, "message": "Parse error"}
    }));

    let error = tokio::time::timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(error.code, -32700);
}

#[tokio::test]
async fn list_changed_flags_set_and_clear() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(all_caps(), |method, _| match method {
            "tools/list" => Some(json!({"tools": []})),
            _ => None,
        }),
    );
    harness.client.connect().await.unwrap();
    assert!(!harness.client.tools_list_changed());

    harness.inject(json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}));
    tokio::time::timeout(WAIT, async {
        while !harness.client.tools_list_changed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    harness.client.list_tools(None).await.unwrap();
    assert!(!harness.client.tools_list_changed());
}

#[tokio::test]
async fn resource_updates_reach_the_subscription_channel() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(all_caps(), |method, _| match method {
            "resources/subscribe" => Some(json!({})),
            _ => None,
        }),
    );
    harness.client.connect().await.unwrap();

    let mut updates = harness
        .client
        .subscribe_to_resource("file:///watched.txt")
        .await
        .unwrap();

    harness.inject(json!({
        "jsonrpc": "2.0",
        "method": "notifications/resources/updated",
        "params": {"uri": "file:///watched.txt"}
    }));

    let update = tokio::time::timeout(WAIT, updates.recv()).await.unwrap().unwrap();
    assert_eq!(update.uri, "file:///watched.txt");
}

#[tokio::test]
async fn tool_arguments_are_validated_against_the_input_schema() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(all_caps(), |method, _| match method {
            "tools/list" => Some(json!({
                "tools": [{
                    "name": "add",
                    "inputSchema": {
                        "type": "object",
                        "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                        "required": ["a", "b"]
                    }
                }]
            })),
            "tools/call" => Some(json!({"content": [{"type": "text", "text": "3"}]})),
            _ => None,
        }),
    );
    harness.client.connect().await.unwrap();
    harness.client.list_tools(None).await.unwrap();

    let result = harness
        .client
        .call_tool("add", Some(json!({"a": 1})))
        .await;
    match result {
        Err(ClientError::ToolArgumentsInvalid { tool, issues }) => {
            assert_eq!(tool, "add");
            assert!(!issues.is_empty());
        }
        other => panic!("expected argument validation failure, got {other:?}"),
    }
    // The invalid call never reached the wire.
    assert!(
        !harness
            .sent_snapshot()
            .iter()
            .any(|m| m["method"] == "tools/call")
    );

    // A valid call goes through.
    let result = harness
        .client
        .call_tool("add", Some(json!({"a": 1, "b": 2})))
        .await
        .unwrap();
    assert_eq!(result.content.len(), 1);
}

#[tokio::test]
async fn disconnect_cancels_in_flight_requests() {
    let harness = Harness::new(
        ClientConfig::default(),
        responder_with(all_caps(), |_, _| None),
    );
    harness.client.connect().await.unwrap();

    let pending = {
        let client = &harness.client;
        async move { client.list_resources(None).await }
    };
    let (pending_result, disconnect_result) = tokio::join!(pending, async {
        // Give the request a moment to register before tearing down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness.client.disconnect().await
    });

    disconnect_result.unwrap();
    assert!(matches!(pending_result, Err(ClientError::RequestCancelled)));
}

#[tokio::test]
async fn request_failure_carries_the_rpc_error() {
    let harness = Harness::new(ClientConfig::default(), {
        move |message: &Value| {
            let method = message.get("method").and_then(Value::as_str);
            let id = message.get("id").cloned();
            match (method, id) {
                (Some("initialize"), Some(id)) => vec![json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": "2025-03-26",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "s", "version": "1.0.0"}
                    }
                })],
                (Some("tools/list"), Some(id)) => vec![json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32603, "message": "backend exploded"}
                })],
                _ => Vec::new(),
            }
        }
    });
    harness.client.connect().await.unwrap();

    let result = harness.client.list_tools(None).await;
    match result {
        Err(ClientError::RequestFailed { error }) => {
            assert_eq!(error.code, -32603);
            assert_eq!(error.message, "backend exploded");
        }
        other => panic!("expected request failure, got {other:?}"),
    }
}

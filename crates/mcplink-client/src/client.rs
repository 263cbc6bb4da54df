//! The client: correlation core and typed API surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex as TokioMutex};
use tracing::{debug, error, trace, warn};

use mcplink_protocol::types::{
    CallToolParams, CallToolResult, CancelledParams, ClientCapabilities, CompleteParams,
    CompleteResult, CompletionArgument, CompletionReference, EmptyResult, GetPromptParams,
    GetPromptResult, Implementation, InitializeParams, InitializeResult, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListRootsResult, ListToolsResult,
    LogLevel, LoggingMessageParams, PaginatedParams, ProgressParams, ReadResourceResult,
    ResourceUriParams, Root, RootsCapability, Tool,
};
use mcplink_protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponsePayload, RequestId, ResponseId, batch, methods, LATEST_PROTOCOL_VERSION,
};
use mcplink_transport_traits::{
    IdGenerator, Transport, TransportEvent, TransportMessage,
};

use crate::error::{ClientError, ClientResult};
use crate::handlers::SamplingHandler;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Capacity of the broadcast channels backing the public streams.
const STREAM_CAPACITY: usize = 256;

/// Connection lifecycle of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection (initial and final state)
    Disconnected,
    /// `connect()` in progress
    Connecting,
    /// Ready for requests
    Connected,
    /// `disconnect()` in progress
    Disconnecting,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Protocol revision offered during initialize
    pub protocol_version: String,
    /// Client name and version sent to the server
    pub client_info: Implementation,
    /// Initial filesystem roots
    pub roots: Vec<Root>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            client_info: Implementation {
                name: "mcplink".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            roots: Vec::new(),
        }
    }
}

type PendingSender = oneshot::Sender<ClientResult<Value>>;

struct ClientInner {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    state: StdMutex<ConnectionState>,
    pending: StdMutex<HashMap<RequestId, PendingSender>>,
    next_id: AtomicI64,
    initialize_result: StdMutex<Option<InitializeResult>>,
    roots: StdMutex<Vec<Root>>,
    sampling_handler: StdMutex<Option<Arc<dyn SamplingHandler>>>,
    subscriptions: StdMutex<HashMap<String, mpsc::UnboundedSender<ResourceUriParams>>>,
    known_tools: StdMutex<HashMap<String, Tool>>,
    prompts_changed: AtomicBool,
    resources_changed: AtomicBool,
    tools_changed: AtomicBool,
    validator: mcplink_schema::Validator,
    connection_state_tx: broadcast::Sender<ConnectionState>,
    errors_tx: broadcast::Sender<JsonRpcError>,
    stream_errors_tx: broadcast::Sender<ClientError>,
    logs_tx: broadcast::Sender<LoggingMessageParams>,
    progress_tx: broadcast::Sender<ProgressParams>,
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The high-level MCP client.
///
/// Owns its transport, correlates responses to requests by id, gates feature
/// APIs on the server's advertised capabilities, and serves the requests a
/// server may initiate (`ping`, `roots/list`, `sampling/createMessage`).
#[derive(Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
    reader_task: TokioMutex<Option<tokio::task::JoinHandle<()>>>,
    event_task: TokioMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Client {
    /// Create a client over `transport` with default configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Create a client with explicit configuration.
    #[must_use]
    pub fn with_config(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let (connection_state_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (errors_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (stream_errors_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (logs_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (progress_tx, _) = broadcast::channel(STREAM_CAPACITY);

        let roots = config.roots.clone();
        Self {
            inner: Arc::new(ClientInner {
                transport,
                config,
                state: StdMutex::new(ConnectionState::Disconnected),
                pending: StdMutex::new(HashMap::new()),
                next_id: AtomicI64::new(1),
                initialize_result: StdMutex::new(None),
                roots: StdMutex::new(roots),
                sampling_handler: StdMutex::new(None),
                subscriptions: StdMutex::new(HashMap::new()),
                known_tools: StdMutex::new(HashMap::new()),
                prompts_changed: AtomicBool::new(false),
                resources_changed: AtomicBool::new(false),
                tools_changed: AtomicBool::new(false),
                validator: mcplink_schema::Validator::new(),
                connection_state_tx,
                errors_tx,
                stream_errors_tx,
                logs_tx,
                progress_tx,
            }),
            reader_task: TokioMutex::new(None),
            event_task: TokioMutex::new(None),
        }
    }

    /// Install the sampling handler serving `sampling/createMessage`.
    pub fn set_sampling_handler(&self, handler: Arc<dyn SamplingHandler>) {
        *self
            .inner
            .sampling_handler
            .lock()
            .expect("handler mutex poisoned") = Some(handler);
    }

    // --- streams --------------------------------------------------------

    /// Connection lifecycle events.
    pub fn connection_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.connection_state_tx.subscribe()
    }

    /// JSON-RPC error envelopes that arrived without a request id.
    pub fn errors(&self) -> broadcast::Receiver<JsonRpcError> {
        self.inner.errors_tx.subscribe()
    }

    /// Failures that cannot be attributed to a single request.
    pub fn stream_errors(&self) -> broadcast::Receiver<ClientError> {
        self.inner.stream_errors_tx.subscribe()
    }

    /// Server log messages (`notifications/message` plus stdio stderr).
    pub fn logs(&self) -> broadcast::Receiver<LoggingMessageParams> {
        self.inner.logs_tx.subscribe()
    }

    /// Progress updates (`notifications/progress`).
    pub fn progress(&self) -> broadcast::Receiver<ProgressParams> {
        self.inner.progress_tx.subscribe()
    }

    // --- lifecycle ------------------------------------------------------

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().expect("state mutex poisoned")
    }

    /// What the server reported during initialize, once connected.
    pub fn server_info(&self) -> Option<Implementation> {
        self.inner
            .initialize_result
            .lock()
            .expect("init mutex poisoned")
            .as_ref()
            .map(|r| r.server_info.clone())
    }

    /// The server's advertised capabilities, once connected.
    pub fn server_capabilities(
        &self,
    ) -> Option<mcplink_protocol::types::ServerCapabilities> {
        self.inner
            .initialize_result
            .lock()
            .expect("init mutex poisoned")
            .as_ref()
            .map(|r| r.capabilities.clone())
    }

    /// Connect: start the transport, run the initialize handshake, announce
    /// `notifications/initialized`.
    ///
    /// Idempotent when already connected.
    ///
    /// # Errors
    ///
    /// Transport and handshake failures; [`ClientError::ConnectionInProgress`]
    /// when racing another transition.
    pub async fn connect(&self) -> ClientResult<()> {
        {
            let mut state = self.inner.state.lock().expect("state mutex poisoned");
            match *state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
                _ => return Err(ClientError::ConnectionInProgress),
            }
        }
        self.inner.broadcast_state(ConnectionState::Connecting);

        match self.connect_steps().await {
            Ok(()) => {
                self.inner.set_state(ConnectionState::Connected);
                debug!("client connected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "connect failed");
                let _ = self.inner.transport.close().await;
                self.inner.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn connect_steps(&self) -> ClientResult<()> {
        let inner = &self.inner;
        inner.transport.start().await?;

        // Event pump first so early transport events are not lost.
        if let Some(mut events) = inner.transport.take_event_receiver().await {
            let pump_inner = Arc::clone(inner);
            let handle = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    pump_inner.handle_transport_event(event);
                }
            });
            *self.event_task.lock().await = Some(handle);
        }

        // Reader task: every inbound payload flows through dispatch.
        {
            let reader_inner = Arc::clone(inner);
            let handle = tokio::spawn(async move {
                loop {
                    match reader_inner.transport.receive().await {
                        Ok(Some(message)) => reader_inner.dispatch_payload(&message.payload),
                        Ok(None) => {
                            debug!("transport receive stream ended");
                            break;
                        }
                        Err(e) => {
                            debug!(error = %e, "transport receive failed");
                            break;
                        }
                    }
                }
                reader_inner.fail_all_pending(ClientError::NotConnected);
            });
            *self.reader_task.lock().await = Some(handle);
        }

        // Handshake: transports with their own handshake (HTTP sessions) run
        // it; the rest get a plain correlated request.
        let params = InitializeParams {
            protocol_version: inner.config.protocol_version.clone(),
            capabilities: self.effective_capabilities(),
            client_info: inner.config.client_info.clone(),
        };
        let id_gen: IdGenerator = {
            let gen_inner = Arc::clone(inner);
            Arc::new(move || RequestId::Number(gen_inner.next_id.fetch_add(1, Ordering::SeqCst)))
        };

        let result = match inner.transport.initialize(params.clone(), id_gen).await? {
            Some(result) => result,
            None => {
                let value = self
                    .request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
                    .await?;
                let result: InitializeResult = serde_json::from_value(value)?;
                inner
                    .send_notification(
                        methods::NOTIF_INITIALIZED,
                        Some(serde_json::json!({})),
                    )
                    .await?;
                result
            }
        };

        debug!(
            server = %result.server_info.name,
            version = %result.protocol_version,
            "initialize complete"
        );
        *inner
            .initialize_result
            .lock()
            .expect("init mutex poisoned") = Some(result);
        Ok(())
    }

    fn effective_capabilities(&self) -> ClientCapabilities {
        let sampling = self
            .inner
            .sampling_handler
            .lock()
            .expect("handler mutex poisoned")
            .is_some()
            .then(|| serde_json::json!({}));
        ClientCapabilities {
            roots: Some(RootsCapability {
                list_changed: Some(true),
            }),
            sampling,
            experimental: None,
        }
    }

    /// Disconnect: cancel every in-flight request, stop background tasks,
    /// tear down the transport.
    ///
    /// Idempotent when already disconnected.
    ///
    /// # Errors
    ///
    /// Transport teardown failures.
    pub async fn disconnect(&self) -> ClientResult<()> {
        {
            let mut state = self.inner.state.lock().expect("state mutex poisoned");
            match *state {
                ConnectionState::Disconnected => return Ok(()),
                ConnectionState::Connected | ConnectionState::Connecting => {
                    *state = ConnectionState::Disconnecting;
                }
                ConnectionState::Disconnecting => return Err(ClientError::ConnectionInProgress),
            }
        }
        self.inner.broadcast_state(ConnectionState::Disconnecting);

        self.inner.fail_all_pending(ClientError::RequestCancelled);
        self.inner
            .subscriptions
            .lock()
            .expect("subscriptions mutex poisoned")
            .clear();

        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.event_task.lock().await.take() {
            handle.abort();
        }

        let close_result = self.inner.transport.close().await;
        *self
            .inner
            .initialize_result
            .lock()
            .expect("init mutex poisoned") = None;
        self.inner.set_state(ConnectionState::Disconnected);
        debug!("client disconnected");
        close_result.map_err(ClientError::from)
    }

    // --- feature APIs ---------------------------------------------------

    /// `prompts/list`.
    ///
    /// # Errors
    ///
    /// Capability, transport, and decoding failures.
    pub async fn list_prompts(&self, cursor: Option<String>) -> ClientResult<ListPromptsResult> {
        self.require_capability("prompts", |caps| caps.prompts.is_some())?;
        self.inner.prompts_changed.store(false, Ordering::SeqCst);
        self.typed_request(
            methods::PROMPTS_LIST,
            Some(serde_json::to_value(PaginatedParams { cursor })?),
        )
        .await
    }

    /// `prompts/get`.
    ///
    /// # Errors
    ///
    /// Capability, transport, and decoding failures.
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, String>>,
    ) -> ClientResult<GetPromptResult> {
        self.require_capability("prompts", |caps| caps.prompts.is_some())?;
        self.typed_request(
            methods::PROMPTS_GET,
            Some(serde_json::to_value(GetPromptParams {
                name: name.into(),
                arguments,
            })?),
        )
        .await
    }

    /// `resources/list`.
    ///
    /// # Errors
    ///
    /// Capability, transport, and decoding failures.
    pub async fn list_resources(
        &self,
        cursor: Option<String>,
    ) -> ClientResult<ListResourcesResult> {
        self.require_capability("resources", |caps| caps.resources.is_some())?;
        self.inner.resources_changed.store(false, Ordering::SeqCst);
        self.typed_request(
            methods::RESOURCES_LIST,
            Some(serde_json::to_value(PaginatedParams { cursor })?),
        )
        .await
    }

    /// `resources/read`.
    ///
    /// # Errors
    ///
    /// Capability, transport, and decoding failures.
    pub async fn read_resource(&self, uri: impl Into<String>) -> ClientResult<ReadResourceResult> {
        self.require_capability("resources", |caps| caps.resources.is_some())?;
        self.typed_request(
            methods::RESOURCES_READ,
            Some(serde_json::to_value(ResourceUriParams { uri: uri.into() })?),
        )
        .await
    }

    /// `resources/subscribe`; updates arrive on the returned channel.
    ///
    /// # Errors
    ///
    /// Capability (including `resources.subscribe`), transport, and decoding
    /// failures.
    pub async fn subscribe_to_resource(
        &self,
        uri: impl Into<String>,
    ) -> ClientResult<mpsc::UnboundedReceiver<ResourceUriParams>> {
        self.require_capability("resources.subscribe", |caps| {
            caps.supports_resource_subscriptions()
        })?;
        let uri = uri.into();
        let _: EmptyResult = self
            .typed_request(
                methods::RESOURCES_SUBSCRIBE,
                Some(serde_json::to_value(ResourceUriParams { uri: uri.clone() })?),
            )
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscriptions
            .lock()
            .expect("subscriptions mutex poisoned")
            .insert(uri, tx);
        Ok(rx)
    }

    /// `resources/unsubscribe`; the subscription channel closes.
    ///
    /// # Errors
    ///
    /// Capability, transport, and decoding failures.
    pub async fn unsubscribe_from_resource(&self, uri: impl Into<String>) -> ClientResult<()> {
        self.require_capability("resources.subscribe", |caps| {
            caps.supports_resource_subscriptions()
        })?;
        let uri = uri.into();
        let _: EmptyResult = self
            .typed_request(
                methods::RESOURCES_UNSUBSCRIBE,
                Some(serde_json::to_value(ResourceUriParams { uri: uri.clone() })?),
            )
            .await?;
        self.inner
            .subscriptions
            .lock()
            .expect("subscriptions mutex poisoned")
            .remove(&uri);
        Ok(())
    }

    /// `resources/templates/list`.
    ///
    /// # Errors
    ///
    /// Capability, transport, and decoding failures.
    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> ClientResult<ListResourceTemplatesResult> {
        self.require_capability("resources", |caps| caps.resources.is_some())?;
        self.typed_request(
            methods::RESOURCE_TEMPLATES_LIST,
            Some(serde_json::to_value(PaginatedParams { cursor })?),
        )
        .await
    }

    /// `tools/list`. Remembers each tool's schemas for argument validation
    /// in [`Client::call_tool`].
    ///
    /// # Errors
    ///
    /// Capability, transport, and decoding failures.
    pub async fn list_tools(&self, cursor: Option<String>) -> ClientResult<ListToolsResult> {
        self.require_capability("tools", |caps| caps.tools.is_some())?;
        self.inner.tools_changed.store(false, Ordering::SeqCst);
        let result: ListToolsResult = self
            .typed_request(
                methods::TOOLS_LIST,
                Some(serde_json::to_value(PaginatedParams { cursor })?),
            )
            .await?;

        let mut known = self
            .inner
            .known_tools
            .lock()
            .expect("tools mutex poisoned");
        for tool in &result.tools {
            known.insert(tool.name.clone(), tool.clone());
        }
        Ok(result)
    }

    /// `tools/call`.
    ///
    /// Arguments are checked against the tool's `inputSchema` and structured
    /// content against its `outputSchema`, when the tool is known from a
    /// previous [`Client::list_tools`].
    ///
    /// # Errors
    ///
    /// Capability, validation, transport, and decoding failures.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<Value>,
    ) -> ClientResult<CallToolResult> {
        self.require_capability("tools", |caps| caps.tools.is_some())?;
        let name = name.into();

        let known_tool = self
            .inner
            .known_tools
            .lock()
            .expect("tools mutex poisoned")
            .get(&name)
            .cloned();

        if let (Some(tool), Some(arguments)) = (&known_tool, &arguments) {
            let outcome = self.inner.validator.validate(arguments, &tool.input_schema);
            if !outcome.is_valid {
                return Err(ClientError::ToolArgumentsInvalid {
                    tool: name,
                    issues: render_issues(&outcome),
                });
            }
        }

        let result: CallToolResult = self
            .typed_request(
                methods::TOOLS_CALL,
                Some(serde_json::to_value(CallToolParams {
                    name: name.clone(),
                    arguments,
                })?),
            )
            .await?;

        if let (Some(tool), Some(structured)) = (&known_tool, &result.structured_content) {
            if let Some(output_schema) = &tool.output_schema {
                let outcome = self.inner.validator.validate(structured, output_schema);
                if !outcome.is_valid {
                    return Err(ClientError::ToolOutputInvalid {
                        tool: name,
                        issues: render_issues(&outcome),
                    });
                }
            }
        }

        Ok(result)
    }

    /// `ping`.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn ping(&self) -> ClientResult<()> {
        let _: EmptyResult = self.typed_request(methods::PING, None).await?;
        Ok(())
    }

    /// `completion/complete`.
    ///
    /// # Errors
    ///
    /// Capability, transport, and decoding failures.
    pub async fn complete(
        &self,
        reference: CompletionReference,
        argument_name: impl Into<String>,
        argument_value: impl Into<String>,
    ) -> ClientResult<CompleteResult> {
        self.require_capability("completions", |caps| caps.completions.is_some())?;
        self.typed_request(
            methods::COMPLETION_COMPLETE,
            Some(serde_json::to_value(CompleteParams {
                reference,
                argument: CompletionArgument {
                    name: argument_name.into(),
                    value: argument_value.into(),
                },
            })?),
        )
        .await
    }

    /// Replace the filesystem roots served to `roots/list`; announces
    /// `notifications/roots/list_changed` when connected.
    ///
    /// # Errors
    ///
    /// Transport failures while announcing the change.
    pub async fn set_roots(&self, roots: Vec<Root>) -> ClientResult<()> {
        *self.inner.roots.lock().expect("roots mutex poisoned") = roots;
        if self.state() == ConnectionState::Connected {
            self.inner
                .send_notification(methods::NOTIF_ROOTS_LIST_CHANGED, None)
                .await?;
        }
        Ok(())
    }

    /// Whether `notifications/prompts/list_changed` arrived since the last
    /// [`Client::list_prompts`].
    pub fn prompts_list_changed(&self) -> bool {
        self.inner.prompts_changed.load(Ordering::SeqCst)
    }

    /// Whether `notifications/resources/list_changed` arrived since the last
    /// [`Client::list_resources`].
    pub fn resources_list_changed(&self) -> bool {
        self.inner.resources_changed.load(Ordering::SeqCst)
    }

    /// Whether `notifications/tools/list_changed` arrived since the last
    /// [`Client::list_tools`].
    pub fn tools_list_changed(&self) -> bool {
        self.inner.tools_changed.load(Ordering::SeqCst)
    }

    // --- correlation core ----------------------------------------------

    fn require_capability(
        &self,
        name: &str,
        check: impl FnOnce(&mcplink_protocol::types::ServerCapabilities) -> bool,
    ) -> ClientResult<()> {
        let init = self
            .inner
            .initialize_result
            .lock()
            .expect("init mutex poisoned");
        let Some(init) = init.as_ref() else {
            return Err(ClientError::NotConnected);
        };
        if check(&init.capabilities) {
            Ok(())
        } else {
            Err(ClientError::CapabilityNotSupported {
                capability: name.to_string(),
            })
        }
    }

    async fn typed_request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> ClientResult<T> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// Send one request and await its response, racing the configured
    /// timeout. Cancellation (timeout or caller drop) removes the pending
    /// entry and sends a best-effort `notifications/cancelled`.
    async fn request(&self, method: &str, params: Option<Value>) -> ClientResult<Value> {
        let inner = &self.inner;
        {
            let state = *inner.state.lock().expect("state mutex poisoned");
            if matches!(
                state,
                ConnectionState::Disconnected | ConnectionState::Disconnecting
            ) {
                return Err(ClientError::NotConnected);
            }
        }
        let id = RequestId::Number(inner.next_id.fetch_add(1, Ordering::SeqCst));

        let (tx, rx) = oneshot::channel();
        inner
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .insert(id.clone(), tx);

        let mut guard = CancelGuard {
            inner: Arc::clone(inner),
            id: id.clone(),
            armed: true,
        };

        let request = JsonRpcRequest::new(id.clone(), method, params);
        let message = TransportMessage::from_json(&request)?;
        if let Err(e) = inner.transport.send(message).await {
            inner.take_pending(&id);
            guard.armed = false;
            return Err(e.into());
        }
        trace!(%id, method, "request sent");

        let outcome = tokio::select! {
            response = rx => match response {
                Ok(result) => result,
                Err(_) => Err(ClientError::RequestCancelled),
            },
            () = tokio::time::sleep(inner.config.request_timeout) => {
                debug!(%id, method, "request timed out");
                inner.take_pending(&id);
                inner.notify_cancelled(&id, Some("request timed out"));
                Err(ClientError::RequestTimedOut)
            }
        };

        guard.armed = false;
        outcome
    }
}

/// Sends `notifications/cancelled` when a request future is dropped before
/// completion (caller-side cancellation).
struct CancelGuard {
    inner: Arc<ClientInner>,
    id: RequestId,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if self.inner.take_pending(&self.id).is_some() {
            self.inner.notify_cancelled(&self.id, Some("request cancelled"));
        }
    }
}

impl ClientInner {
    fn set_state(&self, new_state: ConnectionState) {
        *self.state.lock().expect("state mutex poisoned") = new_state;
        self.broadcast_state(new_state);
    }

    fn broadcast_state(&self, state: ConnectionState) {
        let _ = self.connection_state_tx.send(state);
    }

    fn take_pending(&self, id: &RequestId) -> Option<PendingSender> {
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(id)
    }

    fn fail_all_pending(&self, error: ClientError) {
        let entries: Vec<(RequestId, PendingSender)> = {
            let mut pending = self.pending.lock().expect("pending mutex poisoned");
            pending.drain().collect()
        };
        for (id, tx) in entries {
            trace!(%id, "failing pending request: {error}");
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Fire-and-forget `notifications/cancelled` for `id`.
    fn notify_cancelled(&self, id: &RequestId, reason: Option<&str>) {
        let params = CancelledParams {
            request_id: id.clone(),
            reason: reason.map(str::to_string),
        };
        let notification = match serde_json::to_value(&params) {
            Ok(value) => JsonRpcNotification::new(methods::NOTIF_CANCELLED, Some(value)),
            Err(_) => return,
        };
        let Ok(message) = TransportMessage::from_json(&notification) else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send(message).await {
                debug!(error = %e, "failed to send cancellation notification");
            }
        });
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        let message = TransportMessage::from_json(&notification)?;
        self.transport.send(message).await?;
        Ok(())
    }

    fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.broadcast_state(ConnectionState::Connected);
            }
            TransportEvent::Disconnected { reason } => {
                debug!(?reason, "transport disconnected");
                let was_connected = {
                    let mut state = self.state.lock().expect("state mutex poisoned");
                    let was = *state == ConnectionState::Connected;
                    if was {
                        *state = ConnectionState::Disconnected;
                    }
                    was
                };
                if was_connected {
                    self.broadcast_state(ConnectionState::Disconnected);
                    self.fail_all_pending(ClientError::NotConnected);
                }
            }
            TransportEvent::Log { line } => {
                let _ = self.logs_tx.send(LoggingMessageParams {
                    level: LogLevel::Info,
                    logger: Some("stderr".to_string()),
                    data: Value::String(line),
                });
            }
            TransportEvent::Error { error } => {
                let _ = self.stream_errors_tx.send(ClientError::Transport(error));
            }
        }
    }

    /// Decode one wire payload (single message or batch) and route it.
    fn dispatch_payload(&self, payload: &[u8]) {
        if batch::is_batch(payload) {
            match batch::split_batch(payload) {
                Ok(elements) => {
                    for element in elements {
                        self.dispatch_single(element);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "broken inbound batch");
                    let _ = self.stream_errors_tx.send(ClientError::Protocol(e));
                }
            }
        } else {
            self.dispatch_single(payload);
        }
    }

    fn dispatch_single(&self, payload: &[u8]) {
        match JsonRpcMessage::from_slice(payload) {
            Ok(JsonRpcMessage::Response(response)) => self.dispatch_response(response),
            Ok(JsonRpcMessage::Notification(notification)) => {
                self.dispatch_notification(notification);
            }
            Ok(JsonRpcMessage::Request(request)) => self.dispatch_server_request(request),
            Err(e) => {
                warn!(error = %e, "undecodable inbound message");
                let _ = self.stream_errors_tx.send(ClientError::Protocol(e));
            }
        }
    }

    fn dispatch_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_request_id().cloned() else {
            // Server-initiated error envelope with a null id.
            if let JsonRpcResponsePayload::Error { error } = response.payload {
                warn!(code = error.code, "server error without request id: {}", error.message);
                let _ = self.errors_tx.send(error);
            }
            return;
        };

        let Some(tx) = self.take_pending(&id) else {
            warn!(%id, "response for unknown request id");
            return;
        };

        let outcome = match response.payload {
            JsonRpcResponsePayload::Success { result } => Ok(result),
            JsonRpcResponsePayload::Error { error } => {
                Err(ClientError::RequestFailed { error })
            }
        };
        let _ = tx.send(outcome);
    }

    fn dispatch_notification(&self, notification: JsonRpcNotification) {
        let params = notification.params.unwrap_or(Value::Null);
        match notification.method.as_str() {
            methods::NOTIF_MESSAGE => match serde_json::from_value(params) {
                Ok(message) => {
                    let _ = self.logs_tx.send(message);
                }
                Err(e) => {
                    let _ = self
                        .stream_errors_tx
                        .send(ClientError::InvalidResponse(e.to_string()));
                }
            },
            methods::NOTIF_STDERR => {
                let _ = self.logs_tx.send(LoggingMessageParams {
                    level: LogLevel::Info,
                    logger: Some("stderr".to_string()),
                    data: params,
                });
            }
            methods::NOTIF_PROMPTS_LIST_CHANGED => {
                self.prompts_changed.store(true, Ordering::SeqCst);
            }
            methods::NOTIF_RESOURCES_LIST_CHANGED => {
                self.resources_changed.store(true, Ordering::SeqCst);
            }
            methods::NOTIF_TOOLS_LIST_CHANGED => {
                self.tools_changed.store(true, Ordering::SeqCst);
            }
            methods::NOTIF_CANCELLED => {
                match serde_json::from_value::<CancelledParams>(params) {
                    Ok(cancelled) => {
                        if let Some(tx) = self.take_pending(&cancelled.request_id) {
                            let _ = tx.send(Err(ClientError::RequestCancelled));
                        } else {
                            debug!(id = %cancelled.request_id, "cancellation for unknown request");
                        }
                    }
                    Err(e) => {
                        let _ = self
                            .stream_errors_tx
                            .send(ClientError::InvalidResponse(e.to_string()));
                    }
                }
            }
            methods::NOTIF_RESOURCES_UPDATED => {
                match serde_json::from_value::<ResourceUriParams>(params) {
                    Ok(update) => {
                        let subscriptions = self
                            .subscriptions
                            .lock()
                            .expect("subscriptions mutex poisoned");
                        if let Some(tx) = subscriptions.get(&update.uri) {
                            let _ = tx.send(update);
                        } else {
                            debug!(uri = %update.uri, "update for unsubscribed resource");
                        }
                    }
                    Err(e) => {
                        let _ = self
                            .stream_errors_tx
                            .send(ClientError::InvalidResponse(e.to_string()));
                    }
                }
            }
            methods::NOTIF_PROGRESS => match serde_json::from_value(params) {
                Ok(progress) => {
                    let _ = self.progress_tx.send(progress);
                }
                Err(e) => {
                    let _ = self
                        .stream_errors_tx
                        .send(ClientError::InvalidResponse(e.to_string()));
                }
            },
            other => {
                let _ = self
                    .stream_errors_tx
                    .send(ClientError::UnsupportedNotification {
                        method: other.to_string(),
                    });
            }
        }
    }

    fn dispatch_server_request(&self, request: JsonRpcRequest) {
        match request.method.as_str() {
            methods::PING => {
                self.respond_success(request.id, serde_json::json!({}));
            }
            methods::ROOTS_LIST => {
                let roots = self.roots.lock().expect("roots mutex poisoned").clone();
                match serde_json::to_value(ListRootsResult { roots }) {
                    Ok(result) => self.respond_success(request.id, result),
                    Err(e) => self.respond_error(
                        request.id,
                        -32603,
                        "Internal error",
                        Some(Value::String(e.to_string())),
                    ),
                }
            }
            methods::SAMPLING_CREATE_MESSAGE => {
                let handler = self
                    .sampling_handler
                    .lock()
                    .expect("handler mutex poisoned")
                    .clone();
                let Some(handler) = handler else {
                    self.respond_error(request.id, -32601, "Sampling not supported", None);
                    return;
                };
                let params = match serde_json::from_value(
                    request.params.unwrap_or(Value::Null),
                ) {
                    Ok(params) => params,
                    Err(e) => {
                        self.respond_error(
                            request.id,
                            -32602,
                            "Invalid params",
                            Some(Value::String(e.to_string())),
                        );
                        return;
                    }
                };

                let transport = Arc::clone(&self.transport);
                tokio::spawn(async move {
                    let response = match handler.create_message(params).await {
                        Ok(result) => match serde_json::to_value(result) {
                            Ok(value) => JsonRpcResponse::success(request.id, value),
                            Err(e) => error_response(
                                request.id,
                                -32603,
                                "Internal error",
                                Some(Value::String(e.to_string())),
                            ),
                        },
                        Err(e) => error_response(
                            request.id,
                            -32603,
                            "Internal error",
                            Some(Value::String(e.to_string())),
                        ),
                    };
                    let Ok(message) = TransportMessage::from_json(&response) else {
                        return;
                    };
                    if let Err(e) = transport.send(message).await {
                        debug!(error = %e, "failed to send sampling response");
                    }
                });
            }
            other => {
                let _ = self
                    .stream_errors_tx
                    .send(ClientError::UnexpectedRequestType {
                        method: other.to_string(),
                    });
                self.respond_error(request.id, -32601, "Method not found", None);
            }
        }
    }

    fn respond_success(&self, id: RequestId, result: Value) {
        self.send_response(JsonRpcResponse::success(id, result));
    }

    fn respond_error(&self, id: RequestId, code: i32, message: &str, data: Option<Value>) {
        self.send_response(error_response(id, code, message, data));
    }

    fn send_response(&self, response: JsonRpcResponse) {
        let Ok(message) = TransportMessage::from_json(&response) else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send(message).await {
                debug!(error = %e, "failed to send response to server request");
            }
        });
    }
}

fn error_response(id: RequestId, code: i32, message: &str, data: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse::error(
        ResponseId::from_request(id),
        JsonRpcError {
            code,
            message: message.to_string(),
            data,
        },
    )
}

fn render_issues(outcome: &mcplink_schema::ValidationOutcome) -> Vec<String> {
    outcome
        .errors
        .iter()
        .map(|issue| format!("{}: {}", issue.instance_path, issue.message))
        .collect()
}

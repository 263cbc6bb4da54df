//! Streamable HTTP transport implementation.
//!
//! Speaks the Streamable HTTP dialect (POST for outbound messages, SSE
//! streams for server-initiated traffic) with a compatibility fallback to the
//! older HTTP+SSE dialect, where the server announces its POST URL in an
//! `endpoint` event before anything else can happen.
//!
//! Lifecycle highlights:
//!
//! - `initialize` captures the `Mcp-Session-Id` header and the negotiated
//!   protocol version, sends `notifications/initialized`, then opens the
//!   persistent GET stream;
//! - an HTTP 404 on a later send, once a session exists, means the server
//!   expired the session: the transport re-initializes with a fresh id and
//!   retries the original send exactly once;
//! - the persistent stream reconnects with exponential backoff (capped at
//!   two minutes, ten attempts) and resumes via `Last-Event-ID`;
//! - `Keep-Alive: timeout=<s>` response headers arm a ping timer at 80% of
//!   the server's timeout;
//! - HTTP 401 surfaces as an authentication-required error carrying the
//!   resource-metadata URL for the OAuth flow.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use tokio::sync::{Mutex as TokioMutex, Notify, mpsc};
use tracing::{debug, error, trace, warn};
use url::Url;

use mcplink_protocol::types::{InitializeParams, InitializeResult};
use mcplink_protocol::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponsePayload, RequestId,
    methods, LATEST_PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER,
};
use mcplink_transport_traits::{
    IdGenerator, Transport, TransportError, TransportEvent, TransportEventEmitter,
    TransportMessage, TransportResult, TransportState, TransportType,
};

use crate::session::{Session, ping_interval_from_keep_alive, validate_session_id};
use crate::sse::{ServerSentEvent, SseParser};

/// Header used to resume an SSE stream.
const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// Time allowed for response headers and buffered bodies. SSE bodies are
/// exempt; they live as long as the server keeps them open.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// First reconnection delay; doubles per attempt.
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Reconnection delay cap.
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(120);

/// Reconnection attempts before giving up on the persistent stream.
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// How long the legacy fallback waits for the `endpoint` event.
const ENDPOINT_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct InitContext {
    params: InitializeParams,
    id_gen: IdGenerator,
}

struct Inner {
    client: reqwest::Client,
    server_url: Url,
    state: StdMutex<TransportState>,
    session: StdMutex<Session>,
    auth_token: StdMutex<Option<String>>,
    emitter: TransportEventEmitter,
    inbound_tx: StdMutex<Option<mpsc::UnboundedSender<TransportMessage>>>,
    /// POST target once the legacy dialect announced one.
    post_endpoint: StdMutex<Option<Url>>,
    endpoint_notify: Notify,
    /// Whether `endpoint` events are expected (legacy dialect only).
    legacy_mode: AtomicBool,
    active_streams: AtomicUsize,
    last_activity: StdMutex<Instant>,
    init_context: StdMutex<Option<InitContext>>,
    /// While an initialize waits on a finite SSE stream, its response is
    /// diverted here instead of the inbound channel.
    init_waiter: StdMutex<Option<InitWaiter>>,
    closing: AtomicBool,
}

struct InitWaiter {
    request_id: RequestId,
    tx: mpsc::UnboundedSender<Bytes>,
}

/// What a POST produced.
enum PostOutcome {
    /// Buffered `application/json` body.
    Json(Bytes),
    /// HTTP 202, nothing to read.
    Accepted,
    /// A finite SSE stream was started; its events flow to the inbound
    /// channel.
    StartedStream,
}

enum StreamKind {
    /// The GET stream; reconnected on drop.
    Persistent,
    /// Tied to one POST; never reconnected.
    Finite,
}

/// Streamable HTTP transport.
pub struct StreamableHttpTransport {
    inner: Arc<Inner>,
    event_receiver: TokioMutex<Option<mpsc::Receiver<TransportEvent>>>,
    inbound_rx: TokioMutex<Option<mpsc::UnboundedReceiver<TransportMessage>>>,
    sse_task: TokioMutex<Option<tokio::task::JoinHandle<()>>>,
    ping_task: TokioMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("server_url", &self.inner.server_url.as_str())
            .finish_non_exhaustive()
    }
}

impl StreamableHttpTransport {
    /// Create a transport for `server_url`.
    ///
    /// # Errors
    ///
    /// [`TransportError::InvalidServerUrl`] when the URL does not parse or
    /// the HTTP client cannot be constructed.
    pub fn new(server_url: &str) -> TransportResult<Self> {
        let server_url = Url::parse(server_url)
            .map_err(|e| TransportError::InvalidServerUrl(format!("{server_url}: {e}")))?;
        if !matches!(server_url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidServerUrl(format!(
                "unsupported scheme: {}",
                server_url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .connect_timeout(RESPONSE_TIMEOUT)
            .build()
            .map_err(|e| TransportError::InvalidServerUrl(e.to_string()))?;

        let (emitter, event_receiver) = TransportEventEmitter::new();

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                server_url,
                state: StdMutex::new(TransportState::Disconnected),
                session: StdMutex::new(Session::default()),
                auth_token: StdMutex::new(None),
                emitter,
                inbound_tx: StdMutex::new(None),
                post_endpoint: StdMutex::new(None),
                endpoint_notify: Notify::new(),
                legacy_mode: AtomicBool::new(false),
                active_streams: AtomicUsize::new(0),
                last_activity: StdMutex::new(Instant::now()),
                init_context: StdMutex::new(None),
                init_waiter: StdMutex::new(None),
                closing: AtomicBool::new(false),
            }),
            event_receiver: TokioMutex::new(Some(event_receiver)),
            inbound_rx: TokioMutex::new(None),
            sse_task: TokioMutex::new(None),
            ping_task: TokioMutex::new(None),
        })
    }

    /// Install a bearer token for subsequent requests (after an OAuth flow).
    pub fn set_authorization_token(&self, token: impl Into<String>) {
        *self.inner.auth_token.lock().expect("auth mutex poisoned") = Some(token.into());
    }

    /// Remove the bearer token.
    pub fn clear_authorization_token(&self) {
        *self.inner.auth_token.lock().expect("auth mutex poisoned") = None;
    }

    /// The session id currently in effect, if the server assigned one.
    pub fn session_id(&self) -> Option<String> {
        self.inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .session_id
            .clone()
    }

    /// Perform the `initialize` handshake.
    ///
    /// Captures the session id and negotiated protocol version, sends
    /// `notifications/initialized`, and opens the server's SSE stream. A 4xx
    /// answer (other than 401) falls back to the older HTTP+SSE dialect: the
    /// GET stream is opened first, the `endpoint` event names the POST URL,
    /// and initialize is retried there.
    ///
    /// # Errors
    ///
    /// Authentication, HTTP, and decoding failures.
    pub async fn initialize(
        &self,
        params: InitializeParams,
        id_gen: IdGenerator,
    ) -> TransportResult<InitializeResult> {
        if self.inner.inbound_tx.lock().expect("inbound mutex poisoned").is_none() {
            return Err(TransportError::NotStarted);
        }

        *self
            .inner
            .init_context
            .lock()
            .expect("init context mutex poisoned") = Some(InitContext {
            params: params.clone(),
            id_gen: Arc::clone(&id_gen),
        });

        let request_id = id_gen();
        let payload = initialize_payload(&params, &request_id)?;

        let outcome = post_message(&self.inner, payload.clone(), true).await;
        let result = match outcome {
            Ok(outcome) => decode_initialize_outcome(&self.inner, outcome, &request_id).await?,
            Err(TransportError::ServerHttpError { status, .. })
                if (400..=499).contains(&status) && status != 401 =>
            {
                debug!(status, "initialize rejected, falling back to HTTP+SSE dialect");
                self.fallback_initialize(payload).await?
            }
            Err(e) => return Err(e),
        };

        self.complete_initialize(&result).await?;
        Ok(result)
    }

    /// Legacy-dialect initialize: stream first, `endpoint` event, then POST.
    async fn fallback_initialize(&self, payload: Bytes) -> TransportResult<InitializeResult> {
        self.inner.legacy_mode.store(true, Ordering::SeqCst);
        self.ensure_persistent_stream().await;

        let endpoint_known = async {
            loop {
                let notified = self.inner.endpoint_notify.notified();
                if self
                    .inner
                    .post_endpoint
                    .lock()
                    .expect("endpoint mutex poisoned")
                    .is_some()
                {
                    return;
                }
                // Re-check on every wake-up and on a short tick so a
                // notification between the check and the await is never lost.
                tokio::select! {
                    () = notified => {}
                    () = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        };
        tokio::time::timeout(ENDPOINT_WAIT, endpoint_known)
            .await
            .map_err(|_| {
                TransportError::SseInvalidEndpoint(
                    "no endpoint event before timeout".to_string(),
                )
            })?;

        let request_id = extract_request_id(&payload)?;
        let outcome = post_message(&self.inner, payload, true).await?;
        decode_initialize_outcome(&self.inner, outcome, &request_id).await
    }

    async fn complete_initialize(&self, result: &InitializeResult) -> TransportResult<()> {
        {
            let mut session = self.inner.session.lock().expect("session mutex poisoned");
            session.negotiated_protocol_version = Some(result.protocol_version.clone());
        }

        let initialized = JsonRpcNotification::new(methods::NOTIF_INITIALIZED, Some(serde_json::json!({})));
        let payload = Bytes::from(serde_json::to_vec(&initialized)?);
        post_message(&self.inner, payload, true).await?;

        self.ensure_persistent_stream().await;
        self.ensure_ping_task().await;

        // In request/response-only mode no stream will ever flip the
        // connection state, so a successful handshake has to.
        let sse_disabled = self
            .inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .sse_disabled;
        if sse_disabled {
            mark_connected(&self.inner);
        }

        Ok(())
    }

    async fn ensure_persistent_stream(&self) {
        let mut task = self.sse_task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let sse_disabled = self
            .inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .sse_disabled;
        if sse_disabled {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run_persistent_stream(inner)));
    }

    async fn ensure_ping_task(&self) {
        let mut task = self.ping_task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(run_ping_timer(inner)));
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::StreamableHttp
    }

    async fn state(&self) -> TransportState {
        self.inner.state.lock().expect("state mutex poisoned").clone()
    }

    async fn start(&self) -> TransportResult<()> {
        let mut rx_slot = self.inbound_rx.lock().await;
        if self
            .inner
            .inbound_tx
            .lock()
            .expect("inbound mutex poisoned")
            .is_some()
        {
            return Ok(());
        }

        self.inner.closing.store(false, Ordering::SeqCst);
        self.inner.session.lock().expect("session mutex poisoned").reset();
        *self.inner.post_endpoint.lock().expect("endpoint mutex poisoned") = None;
        self.inner.legacy_mode.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .inner
            .inbound_tx
            .lock()
            .expect("inbound mutex poisoned") = Some(tx);
        *rx_slot = Some(rx);

        debug!(url = %self.inner.server_url, "streamable HTTP transport started");
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.inner.closing.store(true, Ordering::SeqCst);
        set_state(&self.inner, TransportState::Disconnecting);

        if let Some(task) = self.sse_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.ping_task.lock().await.take() {
            task.abort();
        }

        // Tell the server the session is over; failures only get logged.
        let session_id = self.session_id();
        if let Some(id) = session_id {
            let request = self
                .inner
                .client
                .delete(self.inner.server_url.clone())
                .header(SESSION_ID_HEADER, id)
                .header(PROTOCOL_VERSION_HEADER, protocol_version(&self.inner));
            if let Err(e) = tokio::time::timeout(RESPONSE_TIMEOUT, request.send()).await {
                debug!(error = %e, "session DELETE did not complete");
            }
        }

        *self
            .inner
            .inbound_tx
            .lock()
            .expect("inbound mutex poisoned") = None;
        *self.inbound_rx.lock().await = None;
        self.inner.active_streams.store(0, Ordering::SeqCst);

        set_state(&self.inner, TransportState::Disconnected);
        self.inner.emitter.emit_disconnected(None);
        debug!("streamable HTTP transport closed");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        if self
            .inner
            .inbound_tx
            .lock()
            .expect("inbound mutex poisoned")
            .is_none()
        {
            return Err(TransportError::NotStarted);
        }

        touch_activity(&self.inner);

        let payload = message.payload.clone();
        let outcome = post_message(&self.inner, payload.clone(), false).await;

        let outcome = match outcome {
            Err(TransportError::ServerHttpError { status: 404, .. })
                if self.session_id().is_some() =>
            {
                warn!("session expired (404); re-initializing and retrying once");
                self.inner
                    .session
                    .lock()
                    .expect("session mutex poisoned")
                    .session_id = None;
                reinitialize(&self.inner).await?;
                post_message(&self.inner, payload, false).await?
            }
            other => other?,
        };

        match outcome {
            PostOutcome::Json(bytes) => {
                route_inbound(&self.inner, bytes);
                Ok(())
            }
            PostOutcome::Accepted | PostOutcome::StartedStream => Ok(()),
        }
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut channel = self.inbound_rx.lock().await;
        let Some(receiver) = channel.as_mut() else {
            return Err(TransportError::NotStarted);
        };
        Ok(receiver.recv().await)
    }

    async fn take_event_receiver(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_receiver.lock().await.take()
    }

    async fn initialize(
        &self,
        params: InitializeParams,
        id_gen: IdGenerator,
    ) -> TransportResult<Option<InitializeResult>> {
        StreamableHttpTransport::initialize(self, params, id_gen)
            .await
            .map(Some)
    }
}

// ---------------------------------------------------------------------------
// Free functions shared with background tasks
// ---------------------------------------------------------------------------

fn set_state(inner: &Inner, new_state: TransportState) {
    let mut state = inner.state.lock().expect("state mutex poisoned");
    if *state != new_state {
        trace!("http transport state: {} -> {}", *state, new_state);
        *state = new_state;
    }
}

fn touch_activity(inner: &Inner) {
    *inner
        .last_activity
        .lock()
        .expect("activity mutex poisoned") = Instant::now();
}

fn protocol_version(inner: &Inner) -> String {
    inner
        .session
        .lock()
        .expect("session mutex poisoned")
        .negotiated_protocol_version
        .clone()
        .unwrap_or_else(|| LATEST_PROTOCOL_VERSION.to_string())
}

fn route_inbound(inner: &Inner, bytes: Bytes) {
    let tx = inner.inbound_tx.lock().expect("inbound mutex poisoned");
    if let Some(tx) = tx.as_ref() {
        let _ = tx.send(TransportMessage::new(bytes));
    }
}

fn post_target(inner: &Inner) -> Url {
    inner
        .post_endpoint
        .lock()
        .expect("endpoint mutex poisoned")
        .clone()
        .unwrap_or_else(|| inner.server_url.clone())
}

fn common_headers(inner: &Inner) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        PROTOCOL_VERSION_HEADER,
        HeaderValue::from_str(&protocol_version(inner))
            .unwrap_or_else(|_| HeaderValue::from_static(LATEST_PROTOCOL_VERSION)),
    );
    if let Some(id) = &inner.session.lock().expect("session mutex poisoned").session_id {
        if let Ok(value) = HeaderValue::from_str(id) {
            headers.insert(SESSION_ID_HEADER, value);
        }
    }
    if let Some(token) = inner.auth_token.lock().expect("auth mutex poisoned").as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
    }
    headers
}

/// Inspect response headers for session id and keep-alive hints.
fn absorb_response_headers(inner: &Inner, response: &Response) -> TransportResult<()> {
    if let Some(value) = response.headers().get(SESSION_ID_HEADER) {
        let id = value
            .to_str()
            .map_err(|_| TransportError::InvalidSessionId("non-ASCII session id".to_string()))?;
        validate_session_id(id)?;
        inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .session_id = Some(id.to_string());
        trace!(session_id = id, "captured session id");
    }

    let keep_alive = response
        .headers()
        .get(reqwest::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("keep-alive"));
    if keep_alive {
        if let Some(interval) = response
            .headers()
            .get("Keep-Alive")
            .and_then(|v| v.to_str().ok())
            .and_then(ping_interval_from_keep_alive)
        {
            inner
                .session
                .lock()
                .expect("session mutex poisoned")
                .ping_interval = Some(interval);
        }
    }

    Ok(())
}

/// Translate a 401 into the authentication-required error, deriving the
/// resource-metadata URL from `WWW-Authenticate` when present.
fn auth_required_error(inner: &Inner, response: &Response) -> TransportError {
    let www_authenticate = response
        .headers()
        .get(reqwest::header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let resource_metadata_url = www_authenticate
        .as_deref()
        .and_then(extract_resource_metadata_url)
        .unwrap_or_else(|| {
            let url = &inner.server_url;
            let host = url.host_str().unwrap_or("localhost");
            match url.port() {
                Some(port) => format!(
                    "{}://{host}:{port}/.well-known/mcp-resource",
                    url.scheme()
                ),
                None => format!("{}://{host}/.well-known/mcp-resource", url.scheme()),
            }
        });

    TransportError::AuthenticationRequired {
        resource_metadata_url,
        www_authenticate,
    }
}

/// Pull `resource="<url>"` out of a `WWW-Authenticate: Bearer ...` value.
fn extract_resource_metadata_url(header: &str) -> Option<String> {
    let idx = header.find("resource=")?;
    let rest = &header[idx + "resource=".len()..];
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn initialize_payload(params: &InitializeParams, id: &RequestId) -> TransportResult<Bytes> {
    let request = JsonRpcRequest::new(
        id.clone(),
        methods::INITIALIZE,
        Some(serde_json::to_value(params)?),
    );
    Ok(Bytes::from(serde_json::to_vec(&request)?))
}

fn extract_request_id(payload: &[u8]) -> TransportResult<RequestId> {
    let request: JsonRpcRequest = serde_json::from_slice(payload)?;
    Ok(request.id)
}

async fn post_message(
    inner: &Arc<Inner>,
    payload: Bytes,
    internal: bool,
) -> TransportResult<PostOutcome> {
    let target = post_target(inner);
    trace!(url = %target, bytes = payload.len(), internal, "POST");

    let request = inner
        .client
        .post(target)
        .headers(common_headers(inner))
        .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(payload);

    let response = tokio::time::timeout(RESPONSE_TIMEOUT, request.send())
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| TransportError::Io(e.to_string()))?;

    absorb_response_headers(inner, &response)?;

    let status = response.status();
    if status == StatusCode::ACCEPTED {
        return Ok(PostOutcome::Accepted);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(auth_required_error(inner, &response));
    }
    if !status.is_success() {
        let body = tokio::time::timeout(RESPONSE_TIMEOUT, response.bytes())
            .await
            .map_err(|_| TransportError::Timeout)?
            .unwrap_or_default();
        let rpc_error = serde_json::from_slice::<JsonRpcResponse>(&body)
            .ok()
            .and_then(|r| r.as_error().cloned());
        return Err(TransportError::ServerHttpError {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
            rpc_error,
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(TransportError::MissingContentType)?;

    if content_type.starts_with("application/json") {
        let bytes = tokio::time::timeout(RESPONSE_TIMEOUT, response.bytes())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(PostOutcome::Json(bytes))
    } else if content_type.starts_with("text/event-stream") {
        let task_inner = Arc::clone(inner);
        tokio::spawn(async move {
            stream_opened(&task_inner);
            consume_sse_stream(&task_inner, response, StreamKind::Finite).await;
            stream_closed(&task_inner);
        });
        Ok(PostOutcome::StartedStream)
    } else {
        Err(TransportError::InvalidContentType(content_type))
    }
}

/// Turn a POST outcome from an `initialize` into its result.
///
/// A JSON body is the common case. Some servers answer over a finite SSE
/// stream instead; then the stream is consumed inline until the response with
/// our id shows up, while unrelated events flow to the inbound channel.
async fn decode_initialize_outcome(
    inner: &Arc<Inner>,
    outcome: PostOutcome,
    request_id: &RequestId,
) -> TransportResult<InitializeResult> {
    match outcome {
        PostOutcome::Json(bytes) => parse_initialize_response(&bytes),
        PostOutcome::Accepted => Err(TransportError::InvalidResponse(
            "initialize answered with 202 and no body".to_string(),
        )),
        PostOutcome::StartedStream => {
            // The response will arrive as an SSE event; divert it here.
            let (tx, mut rx) = mpsc::unbounded_channel();
            *inner.init_waiter.lock().expect("init waiter poisoned") = Some(InitWaiter {
                request_id: request_id.clone(),
                tx,
            });

            let received = tokio::time::timeout(RESPONSE_TIMEOUT, rx.recv()).await;
            *inner.init_waiter.lock().expect("init waiter poisoned") = None;

            let bytes = received
                .map_err(|_| TransportError::Timeout)?
                .ok_or_else(|| {
                    TransportError::InvalidResponse(
                        "stream ended before the initialize response".to_string(),
                    )
                })?;
            parse_initialize_response(&bytes)
        }
    }
}

fn response_matches_id(bytes: &Bytes, request_id: &RequestId) -> bool {
    serde_json::from_slice::<JsonRpcResponse>(bytes)
        .ok()
        .and_then(|r| r.id.as_request_id().cloned())
        .is_some_and(|id| &id == request_id)
}

fn parse_initialize_response(bytes: &[u8]) -> TransportResult<InitializeResult> {
    let response: JsonRpcResponse = serde_json::from_slice(bytes)
        .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
    match response.payload {
        JsonRpcResponsePayload::Success { result } => serde_json::from_value(result)
            .map_err(|e| TransportError::InvalidResponse(e.to_string())),
        JsonRpcResponsePayload::Error { error } => Err(TransportError::ServerHttpError {
            status: 200,
            body: error.to_string(),
            rpc_error: Some(error),
        }),
    }
}

/// Re-run initialize with the cached parameters and a fresh id (session
/// expiry recovery).
async fn reinitialize(inner: &Arc<Inner>) -> TransportResult<()> {
    let context = inner
        .init_context
        .lock()
        .expect("init context mutex poisoned")
        .clone()
        .ok_or(TransportError::NotStarted)?;

    let request_id = (context.id_gen)();
    let payload = initialize_payload(&context.params, &request_id)?;
    let outcome = post_message(inner, payload, true).await?;
    let result = decode_initialize_outcome(inner, outcome, &request_id).await?;

    inner
        .session
        .lock()
        .expect("session mutex poisoned")
        .negotiated_protocol_version = Some(result.protocol_version);

    let initialized =
        JsonRpcNotification::new(methods::NOTIF_INITIALIZED, Some(serde_json::json!({})));
    let payload = Bytes::from(serde_json::to_vec(&initialized)?);
    post_message(inner, payload, true).await?;
    Ok(())
}

/// Flip to `Connected` and emit the event, exactly once per connection.
fn mark_connected(inner: &Inner) {
    let mut state = inner.state.lock().expect("state mutex poisoned");
    if !matches!(*state, TransportState::Connected) {
        *state = TransportState::Connected;
        drop(state);
        inner.emitter.emit_connected();
    }
}

fn stream_opened(inner: &Inner) {
    let previous = inner.active_streams.fetch_add(1, Ordering::SeqCst);
    if previous == 0 {
        mark_connected(inner);
    }
}

fn stream_closed(inner: &Inner) {
    // Never drops below zero even if opens/closes race.
    let previous = inner
        .active_streams
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
        .unwrap_or(0);
    if previous == 1 && !inner.closing.load(Ordering::SeqCst) {
        set_state(inner, TransportState::Disconnected);
        inner.emitter.emit_disconnected(None);
    }
}

/// Exponential backoff: `base * 2^attempt`, capped, with the server's
/// `retry:` hint overriding the base.
fn reconnect_delay(attempt: u32, retry_override_ms: Option<u64>) -> Duration {
    let base = retry_override_ms
        .map(Duration::from_millis)
        .unwrap_or(RECONNECT_BASE_DELAY);
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(RECONNECT_MAX_DELAY)
}

fn is_reconnectable(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_body() || error.is_request()
}

async fn run_persistent_stream(inner: Arc<Inner>) {
    let mut attempt: u32 = 0;
    let mut retry_override: Option<u64> = None;

    loop {
        if inner.closing.load(Ordering::SeqCst) {
            return;
        }

        let last_event_id = inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .last_event_id
            .clone();

        let mut request = inner
            .client
            .get(inner.server_url.clone())
            .headers(common_headers(&inner))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(id) = last_event_id {
            request = request.header(LAST_EVENT_ID_HEADER, id);
        }

        match request.send().await {
            Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => {
                debug!("server does not support SSE (405); request/response mode only");
                inner
                    .session
                    .lock()
                    .expect("session mutex poisoned")
                    .sse_disabled = true;
                mark_connected(&inner);
                return;
            }
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                inner.emitter.emit_error(auth_required_error(&inner, &response));
                return;
            }
            Ok(response) if response.status().is_success() => {
                if let Err(e) = absorb_response_headers(&inner, &response) {
                    inner.emitter.emit_error(e);
                }
                attempt = 0;
                inner
                    .session
                    .lock()
                    .expect("session mutex poisoned")
                    .reconnect_attempt = 0;
                stream_opened(&inner);
                retry_override = consume_sse_stream(&inner, response, StreamKind::Persistent).await;
                stream_closed(&inner);
                if inner.closing.load(Ordering::SeqCst) {
                    return;
                }
                debug!("persistent SSE stream ended; reconnecting");
            }
            Ok(response) => {
                warn!(status = %response.status(), "persistent SSE stream refused");
            }
            Err(e) if is_reconnectable(&e) => {
                debug!(error = %e, "persistent SSE stream network failure");
            }
            Err(e) => {
                inner.emitter.emit_error(TransportError::Io(e.to_string()));
                return;
            }
        }

        attempt += 1;
        inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .reconnect_attempt = attempt;
        if attempt >= MAX_RECONNECT_ATTEMPTS {
            error!("persistent SSE stream reconnection failed after {attempt} attempts");
            inner.emitter.emit_error(TransportError::ReconnectionFailed { attempts: attempt });
            return;
        }
        let delay = reconnect_delay(attempt, retry_override);
        trace!(attempt, ?delay, "reconnect backoff");
        tokio::time::sleep(delay).await;
    }
}

/// Consume one SSE response body; returns the last `retry:` hint seen.
async fn consume_sse_stream(
    inner: &Arc<Inner>,
    response: Response,
    kind: StreamKind,
) -> Option<u64> {
    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "SSE body read failed");
                break;
            }
        };
        for event in parser.feed(&chunk) {
            handle_sse_event(inner, event, &kind);
        }
        if inner.closing.load(Ordering::SeqCst) {
            break;
        }
    }

    parser.retry_ms()
}

fn handle_sse_event(inner: &Arc<Inner>, event: ServerSentEvent, kind: &StreamKind) {
    if let Some(id) = &event.id {
        inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .last_event_id = Some(id.clone());
    }

    match event.event_type.as_str() {
        "message" => {
            let bytes = Bytes::from(event.data.into_bytes());
            buffer_or_route(inner, bytes);
        }
        "endpoint" => {
            if !inner.legacy_mode.load(Ordering::SeqCst) {
                inner.emitter.emit_error(TransportError::SseUnexpectedEvent(
                    "endpoint event outside HTTP+SSE fallback".to_string(),
                ));
                return;
            }
            if matches!(kind, StreamKind::Finite) {
                inner.emitter.emit_error(TransportError::SseUnexpectedEvent(
                    "endpoint event on a per-request stream".to_string(),
                ));
                return;
            }
            match inner.server_url.join(event.data.trim()) {
                Ok(url) => {
                    debug!(endpoint = %url, "legacy dialect endpoint received");
                    *inner.post_endpoint.lock().expect("endpoint mutex poisoned") = Some(url);
                    inner.endpoint_notify.notify_waiters();
                }
                Err(e) => {
                    inner.emitter.emit_error(TransportError::SseInvalidEndpoint(format!(
                        "{}: {e}",
                        event.data
                    )));
                }
            }
        }
        other => {
            inner.emitter.emit_error(TransportError::SseInvalidEventType(other.to_string()));
        }
    }
}

fn buffer_or_route(inner: &Inner, bytes: Bytes) {
    // While initialize waits on a finite stream, the matching response is
    // diverted to the waiter; everything else goes inbound.
    {
        let waiter = inner.init_waiter.lock().expect("init waiter poisoned");
        if let Some(waiter) = waiter.as_ref() {
            if response_matches_id(&bytes, &waiter.request_id) {
                let _ = waiter.tx.send(bytes);
                return;
            }
        }
    }
    route_inbound(inner, bytes);
}

async fn run_ping_timer(inner: Arc<Inner>) {
    loop {
        if inner.closing.load(Ordering::SeqCst) {
            return;
        }

        let Some(interval) = inner
            .session
            .lock()
            .expect("session mutex poisoned")
            .ping_interval
        else {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        };

        let idle = inner
            .last_activity
            .lock()
            .expect("activity mutex poisoned")
            .elapsed();

        if idle < interval {
            tokio::time::sleep(interval - idle).await;
            continue;
        }

        let id_gen = inner
            .init_context
            .lock()
            .expect("init context mutex poisoned")
            .as_ref()
            .map(|c| Arc::clone(&c.id_gen));
        let Some(id_gen) = id_gen else {
            tokio::time::sleep(interval).await;
            continue;
        };

        let ping = JsonRpcRequest::new(id_gen(), methods::PING, None);
        match serde_json::to_vec(&ping) {
            Ok(payload) => {
                trace!("keep-alive ping");
                if let Err(e) = post_message(&inner, Bytes::from(payload), true).await {
                    debug!(error = %e, "keep-alive ping failed");
                }
            }
            Err(e) => debug!(error = %e, "could not encode ping"),
        }
        // Restart the idle window; ping responses never touch it.
        touch_activity(&inner);
    }
}

//! Child-process stdio transport implementation.
//!
//! Locking follows the same hybrid rule as the rest of the workspace:
//! `std::sync::Mutex` for state that is never held across `.await`,
//! `tokio::sync::Mutex` for I/O halves that are.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, trace, warn};

use mcplink_transport_traits::{
    Transport, TransportError, TransportEvent, TransportEventEmitter, TransportMessage,
    TransportResult, TransportState, TransportType,
};

use crate::MAX_LINE_BYTES;
use crate::config::ServerProcessConfig;
use crate::path_probe::{LoginShellPathProbe, PathProbe, effective_path};

/// Graceful-termination grace period before escalating to a hard kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Grace period after the hard kill.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Stderr lines retained for attachment to an unexpected-EOF error.
const STDERR_RING_LINES: usize = 20;

type StdinWriter = FramedWrite<ChildStdin, LinesCodec>;

/// Stdio transport: spawns the configured server and frames JSON-RPC as
/// newline-delimited UTF-8 lines.
pub struct StdioTransport {
    state: Arc<StdMutex<TransportState>>,
    config: ServerProcessConfig,
    path_probe: Arc<dyn PathProbe>,
    event_emitter: TransportEventEmitter,
    event_receiver: TokioMutex<Option<mpsc::Receiver<TransportEvent>>>,
    child: TokioMutex<Option<Child>>,
    stdin_writer: TokioMutex<Option<StdinWriter>>,
    receive_channel: TokioMutex<Option<mpsc::UnboundedReceiver<TransportMessage>>>,
    reader_task: TokioMutex<Option<tokio::task::JoinHandle<()>>>,
    stderr_task: TokioMutex<Option<tokio::task::JoinHandle<()>>>,
    last_stderr: Arc<StdMutex<VecDeque<String>>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Create a transport for the given server configuration.
    ///
    /// The login-shell PATH probe runs once, on `start()`.
    #[must_use]
    pub fn new(config: ServerProcessConfig) -> Self {
        Self::with_path_probe(config, Arc::new(LoginShellPathProbe))
    }

    /// Create a transport with a custom [`PathProbe`]. Tests use this to pin
    /// the PATH without spawning a login shell.
    #[must_use]
    pub fn with_path_probe(config: ServerProcessConfig, path_probe: Arc<dyn PathProbe>) -> Self {
        let (event_emitter, event_receiver) = TransportEventEmitter::new();

        Self {
            state: Arc::new(StdMutex::new(TransportState::Disconnected)),
            config,
            path_probe,
            event_emitter,
            event_receiver: TokioMutex::new(Some(event_receiver)),
            child: TokioMutex::new(None),
            stdin_writer: TokioMutex::new(None),
            receive_channel: TokioMutex::new(None),
            reader_task: TokioMutex::new(None),
            stderr_task: TokioMutex::new(None),
            last_stderr: Arc::new(StdMutex::new(VecDeque::new())),
        }
    }

    fn set_state(&self, new_state: TransportState) {
        set_state_inner(&self.state, &self.event_emitter, new_state);
    }

    /// Validate an outbound line: framing forbids literal CR/LF bytes
    /// (escaped `\n` sequences inside JSON strings are two bytes and fine).
    fn validate_outbound(text: &str) -> TransportResult<()> {
        if text.contains('\n') || text.contains('\r') {
            return Err(TransportError::EmbeddedNewlines);
        }
        Ok(())
    }

    async fn spawn_server(&self) -> TransportResult<()> {
        // Login shell PATH, process PATH, fixed fallback; probed once per
        // start. Set after the configured env so it always wins.
        let path = effective_path(&*self.path_probe).await;

        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .env("PATH", path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_directory {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "failed to spawn {}: {e}",
                self.config.command
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::ConnectionFailed("child stdin was not piped".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::ConnectionFailed("child stdout was not piped".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            TransportError::ConnectionFailed("child stderr was not piped".to_string())
        })?;

        *self.stdin_writer.lock().await = Some(FramedWrite::new(stdin, LinesCodec::new()));

        let (tx, rx) = mpsc::unbounded_channel();
        *self.receive_channel.lock().await = Some(rx);

        // Stdout pump: one JSON-RPC payload per line.
        {
            let state = Arc::clone(&self.state);
            let emitter = self.event_emitter.clone();
            let last_stderr = Arc::clone(&self.last_stderr);
            let mut reader = FramedRead::new(
                BufReader::new(stdout),
                LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            );

            let handle = tokio::spawn(async move {
                loop {
                    match reader.next().await {
                        Some(Ok(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            trace!(bytes = line.len(), "stdio line received");
                            if tx.send(TransportMessage::new(line)).is_err() {
                                debug!("receive channel dropped, stopping stdout pump");
                                break;
                            }
                        }
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            error!("stdio line exceeded {MAX_LINE_BYTES} bytes");
                            emitter.emit_error(TransportError::BufferLimitExceeded {
                                limit: MAX_LINE_BYTES,
                            });
                            set_state_inner(
                                &state,
                                &emitter,
                                TransportState::Failed {
                                    reason: "receive buffer limit exceeded".to_string(),
                                },
                            );
                            break;
                        }
                        Some(Err(LinesCodecError::Io(e))) => {
                            error!(error = %e, "stdio read failed");
                            emitter.emit_error(TransportError::Io(e.to_string()));
                            set_state_inner(
                                &state,
                                &emitter,
                                TransportState::Failed { reason: e.to_string() },
                            );
                            break;
                        }
                        None => {
                            let shutting_down = matches!(
                                *state.lock().expect("state mutex poisoned"),
                                TransportState::Disconnecting | TransportState::Disconnected
                            );
                            if shutting_down {
                                debug!("stdout closed during shutdown");
                            } else {
                                let stderr_tail = stderr_tail(&last_stderr);
                                warn!(stderr = ?stderr_tail, "server closed stdout unexpectedly");
                                emitter.emit_error(TransportError::ServerClosedOutputStream {
                                    stderr: stderr_tail,
                                });
                                set_state_inner(
                                    &state,
                                    &emitter,
                                    TransportState::Failed {
                                        reason: "server closed its output stream".to_string(),
                                    },
                                );
                            }
                            break;
                        }
                    }
                }
            });
            *self.reader_task.lock().await = Some(handle);
        }

        // Stderr pump: every line becomes a log event and lands in the ring.
        {
            let emitter = self.event_emitter.clone();
            let last_stderr = Arc::clone(&self.last_stderr);
            let mut lines = BufReader::new(stderr).lines();

            let handle = tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    {
                        let mut ring = last_stderr.lock().expect("stderr ring poisoned");
                        if ring.len() == STDERR_RING_LINES {
                            ring.pop_front();
                        }
                        ring.push_back(line.clone());
                    }
                    emitter.emit_log(line);
                }
                debug!("stderr pump completed");
            });
            *self.stderr_task.lock().await = Some(handle);
        }

        *self.child.lock().await = Some(child);
        Ok(())
    }

    /// Terminate the child: graceful signal, 2 s grace, hard kill, 1 s grace.
    async fn terminate(child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }

        if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
            return;
        }

        debug!("graceful termination window elapsed, killing server");
        let _ = child.start_kill();
        let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
    }
}

fn set_state_inner(
    state: &StdMutex<TransportState>,
    emitter: &TransportEventEmitter,
    new_state: TransportState,
) {
    let mut guard = state.lock().expect("state mutex poisoned");
    if *guard != new_state {
        trace!("stdio transport state: {} -> {}", *guard, new_state);
        let was = std::mem::replace(&mut *guard, new_state.clone());
        drop(guard);

        match new_state {
            TransportState::Connected => emitter.emit_connected(),
            TransportState::Disconnected if !matches!(was, TransportState::Connecting) => {
                emitter.emit_disconnected(None);
            }
            TransportState::Failed { reason } => emitter.emit_disconnected(Some(reason)),
            _ => {}
        }
    }
}

fn stderr_tail(ring: &StdMutex<VecDeque<String>>) -> Option<String> {
    let ring = ring.lock().expect("stderr ring poisoned");
    if ring.is_empty() {
        None
    } else {
        Some(ring.iter().cloned().collect::<Vec<_>>().join("\n"))
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    async fn state(&self) -> TransportState {
        self.state.lock().expect("state mutex poisoned").clone()
    }

    async fn start(&self) -> TransportResult<()> {
        if matches!(self.state().await, TransportState::Connected) {
            return Ok(());
        }

        self.set_state(TransportState::Connecting);

        match self.spawn_server().await {
            Ok(()) => {
                self.set_state(TransportState::Connected);
                debug!(command = %self.config.command, "stdio transport connected");
                Ok(())
            }
            Err(e) => {
                self.set_state(TransportState::Failed {
                    reason: e.to_string(),
                });
                error!(error = %e, "failed to start stdio transport");
                Err(e)
            }
        }
    }

    async fn close(&self) -> TransportResult<()> {
        if matches!(self.state().await, TransportState::Disconnected) {
            return Ok(());
        }

        self.set_state(TransportState::Disconnecting);

        // Dropping the writer closes the child's stdin, which is the polite
        // shutdown request for stdio servers.
        *self.stdin_writer.lock().await = None;

        if let Some(mut child) = self.child.lock().await.take() {
            Self::terminate(&mut child).await;
        }

        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_task.lock().await.take() {
            handle.abort();
        }
        *self.receive_channel.lock().await = None;

        self.set_state(TransportState::Disconnected);
        debug!("stdio transport disconnected");
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        match self.state().await {
            TransportState::Connected => {}
            TransportState::Disconnected => return Err(TransportError::NotStarted),
            state => {
                return Err(TransportError::SendFailed(format!(
                    "transport not connected: {state}"
                )));
            }
        }

        let text = message.as_str()?.to_string();
        Self::validate_outbound(&text)?;

        let mut writer = self.stdin_writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| TransportError::SendFailed("stdin writer not available".to_string()))?;

        writer.send(text).await.map_err(|e| {
            error!(error = %e, "failed to write to server stdin");
            TransportError::SendFailed(e.to_string())
        })?;
        SinkExt::<String>::flush(writer)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        trace!(bytes = message.size(), "stdio message sent");
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut channel = self.receive_channel.lock().await;
        let Some(receiver) = channel.as_mut() else {
            return Err(TransportError::NotStarted);
        };
        Ok(receiver.recv().await)
    }

    async fn take_event_receiver(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.event_receiver.lock().await.take()
    }
}

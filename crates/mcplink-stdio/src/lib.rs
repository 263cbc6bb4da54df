//! # Standard I/O Transport
//!
//! Spawns an MCP server as a child process and speaks newline-delimited
//! JSON-RPC over its stdin/stdout. Stderr is captured line-by-line and
//! surfaced as log events; the most recent stderr text is attached to the
//! error raised when the server closes stdout unexpectedly.
//!
//! ## PATH construction
//!
//! GUI hosts inherit a minimal PATH, so before spawning, the transport merges
//! (in order, de-duplicated):
//!
//! 1. the PATH reported by the user's login shell,
//! 2. the current process's PATH,
//! 3. a fixed `/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin` fallback.
//!
//! The login-shell probe is behind the [`PathProbe`] trait so tests can
//! substitute a fixed PATH.
//!
//! ## Shutdown
//!
//! `close()` drops stdin, asks the process to terminate, waits 2 s, then
//! hard-kills and waits 1 s more. Process exit emits a `Disconnected` event.

mod config;
mod path_probe;
mod transport;

pub use config::ServerProcessConfig;
pub use path_probe::{
    FALLBACK_PATH, FixedPathProbe, LoginShellPathProbe, PathProbe, effective_path,
    merge_path_segments,
};
pub use transport::StdioTransport;

/// Inbound line-buffer cap. A single message longer than this is fatal.
pub const MAX_LINE_BYTES: usize = 128 * 1024 * 1024;

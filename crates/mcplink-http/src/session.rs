//! Per-connection session state for the Streamable HTTP transport.

use std::time::Duration;

use mcplink_transport_traits::{TransportError, TransportResult};

/// State negotiated with the server over one `connect()`.
///
/// Mutated only by the transport that owns it, behind short-lived locks.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Server-assigned session id (`Mcp-Session-Id` response header)
    pub session_id: Option<String>,
    /// Id of the last SSE event received; drives `Last-Event-ID` resumption
    pub last_event_id: Option<String>,
    /// Consecutive reconnection attempts on the persistent stream
    pub reconnect_attempt: u32,
    /// Protocol version the server chose during initialize
    pub negotiated_protocol_version: Option<String>,
    /// False once the server answered the GET stream with 405
    pub sse_disabled: bool,
    /// Keep-alive ping interval derived from response headers
    pub ping_interval: Option<Duration>,
}

impl Session {
    /// Reset to the pristine state used by a fresh `connect()`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Validate a server-assigned session id: visible ASCII (0x21–0x7E) only.
///
/// # Errors
///
/// [`TransportError::InvalidSessionId`] when the id is empty or contains a
/// byte outside the allowed range.
pub fn validate_session_id(id: &str) -> TransportResult<()> {
    if id.is_empty() || !id.bytes().all(|b| (0x21..=0x7E).contains(&b)) {
        return Err(TransportError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}

/// Derive the keep-alive ping interval from a `Keep-Alive: timeout=<s>`
/// header value: 80% of the server's timeout, floored at one second.
pub fn ping_interval_from_keep_alive(header: &str) -> Option<Duration> {
    let timeout_secs: u64 = header
        .split(',')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("timeout="))
        .and_then(|v| v.trim().parse().ok())?;

    let scaled_ms = timeout_secs * 800;
    Some(Duration::from_millis(scaled_ms.max(1000)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn session_ids_must_be_visible_ascii() {
        assert!(validate_session_id("abc-123_XYZ~").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("has space").is_err());
        assert!(validate_session_id("tab\there").is_err());
        assert!(validate_session_id("Ünicode").is_err());
    }

    #[test]
    fn keep_alive_interval_is_80_percent() {
        assert_eq!(
            ping_interval_from_keep_alive("timeout=10"),
            Some(Duration::from_secs(8))
        );
        assert_eq!(
            ping_interval_from_keep_alive("timeout=5, max=100"),
            Some(Duration::from_secs(4))
        );
    }

    #[test]
    fn keep_alive_interval_floors_at_one_second() {
        assert_eq!(
            ping_interval_from_keep_alive("timeout=1"),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            ping_interval_from_keep_alive("timeout=0"),
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn malformed_keep_alive_yields_none() {
        assert_eq!(ping_interval_from_keep_alive("max=100"), None);
        assert_eq!(ping_interval_from_keep_alive("timeout=abc"), None);
    }
}

//! Server-Sent Events (SSE) decoding.
//!
//! A pure, no-I/O push parser: feed it byte chunks in whatever sizes the HTTP
//! client produces and collect complete events. Chunk boundaries never change
//! the result; a trailing partial line is carried until the next `feed` (or
//! inspected via [`SseParser::overflow`] at end of stream).
//!
//! ## SSE format
//!
//! ```text
//! id: event-123
//! event: message
//! data: {"jsonrpc": "2.0", ...}
//!
//! ```
//!
//! Events are terminated by a blank line. Lines end with LF, CR, or CRLF.
//! A leading `:` marks a comment line; a `retry:` line updates the
//! reconnection delay; `id:` updates the last-event id, which persists across
//! events and drives `Last-Event-ID` resumption.

/// Event type used when a stream does not name one.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// A decoded Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSentEvent {
    /// Event type (`message` unless the stream said otherwise)
    pub event_type: String,
    /// Event data; multiple `data:` lines are joined with LF
    pub data: String,
    /// Last-event id in effect when this event was dispatched
    pub id: Option<String>,
    /// Reconnection delay in effect, when the stream set one
    pub retry_ms: Option<u64>,
}

/// Incremental SSE parser.
#[derive(Debug, Default)]
pub struct SseParser {
    line: Vec<u8>,
    saw_cr: bool,
    event_type: String,
    data_lines: Vec<String>,
    last_event_id: String,
    retry_ms: Option<u64>,
}

impl SseParser {
    /// Create a parser with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes; returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerSentEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            if self.saw_cr {
                self.saw_cr = false;
                if byte == b'\n' {
                    // LF paired with the CR that already ended the line
                    continue;
                }
            }
            match byte {
                b'\r' => {
                    self.saw_cr = true;
                    self.end_line(&mut events);
                }
                b'\n' => self.end_line(&mut events),
                other => self.line.push(other),
            }
        }

        events
    }

    /// The id resumption should send as `Last-Event-ID`, if any was seen.
    pub fn last_event_id(&self) -> Option<&str> {
        if self.last_event_id.is_empty() {
            None
        } else {
            Some(&self.last_event_id)
        }
    }

    /// The most recent `retry:` value, if the stream set one.
    pub fn retry_ms(&self) -> Option<u64> {
        self.retry_ms
    }

    /// Bytes of an unterminated trailing line, preserved across feeds.
    pub fn overflow(&self) -> &[u8] {
        &self.line
    }

    fn end_line(&mut self, events: &mut Vec<ServerSentEvent>) {
        let raw = std::mem::take(&mut self.line);
        // Lines that are not valid UTF-8 are dropped wholesale.
        let Ok(line) = String::from_utf8(raw) else {
            return;
        };
        self.process_line(&line, events);
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<ServerSentEvent>) {
        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return; // comment
        }

        let (name, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                // A single leading space belongs to the separator.
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match name {
            "event" => self.event_type = value.to_string(),
            "data" => self.data_lines.push(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = value.to_string();
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse() {
                        self.retry_ms = Some(ms);
                    }
                }
            }
            _ => {} // unknown fields are ignored
        }
    }

    fn dispatch(&mut self, events: &mut Vec<ServerSentEvent>) {
        let event_type = std::mem::take(&mut self.event_type);
        let data_lines = std::mem::take(&mut self.data_lines);

        // A block with no data dispatches nothing; lastEventId still sticks.
        if data_lines.is_empty() {
            return;
        }

        events.push(ServerSentEvent {
            event_type: if event_type.is_empty() {
                DEFAULT_EVENT_TYPE.to_string()
            } else {
                event_type
            },
            data: data_lines.join("\n"),
            id: self.last_event_id().map(str::to_string),
            retry_ms: self.retry_ms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn feed_all(input: &[u8]) -> Vec<ServerSentEvent> {
        SseParser::new().feed(input)
    }

    #[test]
    fn single_event_with_default_type() {
        let events = feed_all(b"data: hello\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "message");
        assert_eq!(events[0].data, "hello");
        assert_eq!(events[0].id, None);
    }

    #[test]
    fn multi_line_data_joined_with_lf() {
        let events = feed_all(b"data: line1\ndata: line2\ndata:\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2\n");
    }

    #[test]
    fn event_type_and_id_fields() {
        let events = feed_all(b"event: endpoint\nid: e1\ndata: /messages\n\n");
        assert_eq!(events[0].event_type, "endpoint");
        assert_eq!(events[0].id.as_deref(), Some("e1"));
        assert_eq!(events[0].data, "/messages");
    }

    #[test]
    fn last_event_id_persists_across_events() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"id: e7\ndata: one\n\ndata: two\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("e7"));
        assert_eq!(events[1].id.as_deref(), Some("e7"));
        assert_eq!(parser.last_event_id(), Some("e7"));
    }

    #[test]
    fn id_with_nul_is_ignored() {
        let mut parser = SseParser::new();
        parser.feed(b"id: bad\0id\ndata: x\n\n");
        assert_eq!(parser.last_event_id(), None);
    }

    #[test]
    fn retry_field_sets_delay_only_when_numeric() {
        let mut parser = SseParser::new();
        parser.feed(b"retry: 1500\n");
        assert_eq!(parser.retry_ms(), Some(1500));
        parser.feed(b"retry: soon\n");
        assert_eq!(parser.retry_ms(), Some(1500));
    }

    #[test]
    fn comments_are_ignored() {
        let events = feed_all(b": keep-alive\ndata: x\n: another\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn field_without_colon_has_empty_value() {
        // "data" alone contributes an empty data line
        let events = feed_all(b"data\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn value_keeps_extra_leading_spaces() {
        let events = feed_all(b"data:  two spaces\n\n");
        assert_eq!(events[0].data, " two spaces");
    }

    #[test]
    fn cr_and_crlf_line_endings() {
        let events = feed_all(b"data: a\r\rdata: b\r\n\r\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
    }

    #[test]
    fn crlf_split_across_chunks_is_one_line_break() {
        let mut parser = SseParser::new();
        let mut events = parser.feed(b"data: x\r");
        events.extend(parser.feed(b"\n\r\n"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn block_with_no_data_dispatches_nothing() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: noop\nid: e9\n\n");
        assert!(events.is_empty());
        // id sticks even without a dispatched event
        assert_eq!(parser.last_event_id(), Some("e9"));
    }

    #[test]
    fn event_type_resets_after_dispatch() {
        let events = feed_all(b"event: custom\ndata: a\n\ndata: b\n\n");
        assert_eq!(events[0].event_type, "custom");
        assert_eq!(events[1].event_type, "message");
    }

    #[test]
    fn invalid_utf8_lines_are_dropped() {
        let mut input = b"data: ok\n".to_vec();
        input.extend(b"data: \xFF\xFE\n");
        input.extend(b"\n");
        let events = feed_all(&input);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn partial_line_is_preserved_as_overflow() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: complete\n\ndata: parti");
        assert_eq!(events.len(), 1);
        assert_eq!(parser.overflow(), b"data: parti");

        let events = parser.feed(b"al\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "partial");
    }

    proptest! {
        /// Chunking must not affect the decoded event sequence.
        #[test]
        fn chunking_invariance(input in proptest::collection::vec(any::<u8>(), 0..512), split in 1usize..64) {
            let whole = SseParser::new().feed(&input);

            let mut parser = SseParser::new();
            let mut chunked = Vec::new();
            for chunk in input.chunks(split) {
                chunked.extend(parser.feed(chunk));
            }

            prop_assert_eq!(whole, chunked);
        }

        #[test]
        fn structured_chunking_invariance(
            ids in proptest::collection::vec("[a-z0-9]{1,8}", 1..8),
            split in 1usize..16,
        ) {
            let mut input = Vec::new();
            for (i, id) in ids.iter().enumerate() {
                input.extend_from_slice(format!("id: {id}\ndata: payload-{i}\n\n").as_bytes());
            }

            let whole = SseParser::new().feed(&input);
            let mut parser = SseParser::new();
            let mut chunked = Vec::new();
            for chunk in input.chunks(split) {
                chunked.extend(parser.feed(chunk));
            }

            prop_assert_eq!(whole.len(), ids.len());
            prop_assert_eq!(whole, chunked);
        }
    }
}

//! Raw JSON-RPC batch splitting.
//!
//! Transports receive batch payloads as opaque byte buffers and need the
//! individual elements before any of them can be decoded (a single broken
//! element must not poison its siblings). The splitter walks the buffer once,
//! tracking bracket depth and string escapes, and hands back the byte range of
//! each top-level element untouched.

use crate::error::{ProtocolError, ProtocolResult};

/// Returns `true` if the buffer looks like a batch: its first non-whitespace
/// byte is `[`.
pub fn is_batch(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[')
}

/// Split a batch buffer into the raw byte ranges of its top-level elements.
///
/// Nested arrays/objects and string escapes are respected; elements are
/// returned exactly as they appear on the wire, trimmed of surrounding
/// whitespace, without being decoded.
///
/// # Errors
///
/// - [`ProtocolError::MalformedBatch`] if the buffer does not start with `[`,
///   brackets are unbalanced, a string is unterminated, or non-whitespace
///   bytes trail the closing `]`.
/// - [`ProtocolError::EmptyBatch`] for `[]` (and whitespace-only variants).
pub fn split_batch(bytes: &[u8]) -> ProtocolResult<Vec<&[u8]>> {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .ok_or_else(|| ProtocolError::MalformedBatch("empty buffer".into()))?;

    if bytes[start] != b'[' {
        return Err(ProtocolError::MalformedBatch(
            "batch must start with '['".into(),
        ));
    }

    let mut elements: Vec<&[u8]> = Vec::new();
    let mut depth: u32 = 0; // nesting inside the outer array
    let mut element_start: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;
    let mut end: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => {
                in_string = true;
                if depth == 0 && element_start.is_none() {
                    element_start = Some(i);
                }
            }
            b'{' | b'[' => {
                if depth == 0 && element_start.is_none() {
                    element_start = Some(i);
                }
                depth += 1;
            }
            b'}' | b']' if depth > 0 => {
                depth -= 1;
            }
            b']' => {
                // closing bracket of the outer array
                if let Some(s) = element_start.take() {
                    elements.push(trim_ascii(&bytes[s..i]));
                }
                end = Some(i);
                break;
            }
            b',' if depth == 0 => {
                let s = element_start.take().ok_or_else(|| {
                    ProtocolError::MalformedBatch("empty batch element".into())
                })?;
                elements.push(trim_ascii(&bytes[s..i]));
            }
            b if b.is_ascii_whitespace() => {}
            _ => {
                if depth == 0 && element_start.is_none() {
                    element_start = Some(i);
                }
            }
        }
    }

    let Some(end) = end else {
        return Err(ProtocolError::MalformedBatch(
            "unterminated batch".into(),
        ));
    };
    if in_string {
        return Err(ProtocolError::MalformedBatch("unterminated string".into()));
    }
    if bytes[end + 1..].iter().any(|b| !b.is_ascii_whitespace()) {
        return Err(ProtocolError::MalformedBatch(
            "trailing bytes after batch".into(),
        ));
    }
    if elements.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    if elements.iter().any(|e| e.is_empty()) {
        return Err(ProtocolError::MalformedBatch("empty batch element".into()));
    }

    Ok(elements)
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

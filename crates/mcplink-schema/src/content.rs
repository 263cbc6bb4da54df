//! `contentEncoding` / `contentMediaType` checks.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

/// Decode a string per `contentEncoding`. `None` means the encoding is
/// unknown and asserts nothing.
pub fn decode(encoding: &str, value: &str) -> Option<Result<Vec<u8>, String>> {
    let decoded = match encoding {
        "base64" => STANDARD
            .decode(value)
            .map_err(|e| format!("invalid base64: {e}")),
        "base64url" => URL_SAFE_NO_PAD
            .decode(value.trim_end_matches('='))
            .map_err(|e| format!("invalid base64url: {e}")),
        "binary" => Ok(value.as_bytes().to_vec()),
        "quoted-printable" => decode_quoted_printable(value),
        _ => return None,
    };
    Some(decoded)
}

/// Check decoded bytes against `contentMediaType`. `None` means the media
/// type is unknown and asserts nothing.
pub fn check_media_type(media_type: &str, bytes: &[u8]) -> Option<Result<(), String>> {
    let result = match media_type {
        "application/json" => serde_json::from_slice::<serde_json::Value>(bytes)
            .map(|_| ())
            .map_err(|e| format!("invalid JSON: {e}")),
        "application/xml" | "text/xml" => check_xmlish(bytes),
        "text/plain" | "text/html" => match std::str::from_utf8(bytes) {
            Ok(_) => Ok(()),
            Err(e) => Err(format!("invalid UTF-8: {e}")),
        },
        _ => return None,
    };
    Some(result)
}

/// Parse decoded JSON for a `contentSchema` check.
pub fn parse_json(bytes: &[u8]) -> Option<serde_json::Value> {
    serde_json::from_slice(bytes).ok()
}

fn decode_quoted_printable(value: &str) -> Result<Vec<u8>, String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'=' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        // '=' introduces either a soft line break or two hex digits.
        if bytes[i + 1..].starts_with(b"\r\n") {
            i += 3;
        } else if bytes[i + 1..].starts_with(b"\n") {
            i += 2;
        } else if i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .map_err(|_| "invalid quoted-printable escape".to_string())?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| format!("invalid quoted-printable escape '={hex}'"))?;
            out.push(byte);
            i += 3;
        } else {
            return Err("truncated quoted-printable escape".to_string());
        }
    }
    Ok(out)
}

/// Cheap well-formedness screen for XML content: non-empty, starts with `<`,
/// and has balanced angle brackets.
fn check_xmlish(bytes: &[u8]) -> Result<(), String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {e}"))?;
    let trimmed = text.trim_start();
    if !trimmed.starts_with('<') {
        return Err("XML content must start with '<'".to_string());
    }
    let opens = trimmed.matches('<').count();
    let closes = trimmed.matches('>').count();
    if opens != closes {
        return Err("unbalanced XML brackets".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn base64_round_trip() {
        assert_eq!(decode("base64", "aGVsbG8=").unwrap().unwrap(), b"hello");
        assert!(decode("base64", "###").unwrap().is_err());
    }

    #[test]
    fn base64url_accepts_unpadded() {
        assert_eq!(decode("base64url", "aGVsbG8").unwrap().unwrap(), b"hello");
        assert_eq!(decode("base64url", "aGVsbG8=").unwrap().unwrap(), b"hello");
    }

    #[test]
    fn quoted_printable_escapes_and_soft_breaks() {
        assert_eq!(
            decode("quoted-printable", "caf=C3=A9").unwrap().unwrap(),
            "café".as_bytes()
        );
        assert_eq!(
            decode("quoted-printable", "long=\r\nline").unwrap().unwrap(),
            b"longline"
        );
        assert!(decode("quoted-printable", "bad=ZZ").unwrap().is_err());
    }

    #[test]
    fn unknown_encoding_asserts_nothing() {
        assert!(decode("rot13", "anything").is_none());
    }

    #[test]
    fn media_types() {
        assert!(check_media_type("application/json", br#"{"a":1}"#).unwrap().is_ok());
        assert!(check_media_type("application/json", b"{nope").unwrap().is_err());
        assert!(check_media_type("text/xml", b"<a><b/></a>").unwrap().is_ok());
        assert!(check_media_type("text/xml", b"not xml").unwrap().is_err());
        assert!(check_media_type("text/plain", b"anything").unwrap().is_ok());
        assert!(check_media_type("application/octet-stream", b"x").is_none());
    }
}

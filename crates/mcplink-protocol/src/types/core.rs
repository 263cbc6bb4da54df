//! Core protocol primitives shared across requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-RPC request identifier: a string or an integer.
///
/// The protocol forbids fractional or null ids on requests, so the enum stays
/// closed over these two variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Integer identifier
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Name and version of an MCP implementation (client or server).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name
    pub name: String,
    /// Implementation version
    pub version: String,
}

/// Opaque pagination cursor.
pub type Cursor = String;

/// Parameters for paginated list requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedParams {
    /// Cursor returned by a previous page, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// An intentionally empty result object (`{}` on the wire).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResult {}

/// Parameters of `notifications/cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    /// Id of the request being cancelled
    pub request_id: RequestId,
    /// Optional human-readable reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Parameters of `notifications/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// Token correlating this update to the originating request
    pub progress_token: Value,
    /// Progress so far
    pub progress: f64,
    /// Total work, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Optional status message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_id_serializes_untagged() {
        assert_eq!(
            serde_json::to_string(&RequestId::from("abc")).unwrap(),
            r#""abc""#
        );
        assert_eq!(serde_json::to_string(&RequestId::from(42)).unwrap(), "42");
    }

    #[test]
    fn request_id_deserializes_both_shapes() {
        let s: RequestId = serde_json::from_str(r#""x1""#).unwrap();
        assert_eq!(s, RequestId::from("x1"));
        let n: RequestId = serde_json::from_str("7").unwrap();
        assert_eq!(n, RequestId::from(7));
    }

    #[test]
    fn cancelled_params_wire_shape() {
        let p = CancelledParams {
            request_id: RequestId::from(42),
            reason: None,
        };
        assert_eq!(serde_json::to_string(&p).unwrap(), r#"{"requestId":42}"#);
    }
}

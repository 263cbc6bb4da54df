//! Filesystem roots the client exposes to servers.

use serde::{Deserialize, Serialize};

/// A root directory or file the server may operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    /// Root URI; must use the `file://` scheme
    pub uri: String,
    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of `roots/list` (client answers the server here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// The configured roots
    pub roots: Vec<Root>,
}

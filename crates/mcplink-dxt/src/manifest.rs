//! The `manifest.json` model.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DxtError, DxtResult};

/// File name of the manifest inside an extracted extension.
pub const MANIFEST_FILE: &str = "manifest.json";

/// A desktop extension manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DxtManifest {
    /// Manifest format version
    pub dxt_version: String,
    /// Extension name
    pub name: String,
    /// Extension version
    pub version: String,
    /// How to run the bundled server
    pub server: DxtServer,
    /// User-configurable values the host collects before launch
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_config: HashMap<String, UserConfigSpec>,
    /// Host requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility: Option<Compatibility>,
}

/// Server block of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DxtServer {
    /// Kind of server bundled
    #[serde(rename = "type")]
    pub server_type: DxtServerType,
    /// Path of the server's entry file, relative to the extension root
    pub entry_point: String,
    /// Launch configuration
    pub mcp_config: McpConfig,
}

/// Kind of bundled server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DxtServerType {
    /// Python script; needs a `python` runtime
    Python,
    /// Node script; needs a `node` runtime
    Node,
    /// Native executable; must carry the executable bit
    Binary,
}

/// Launch configuration, before substitution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    /// Command to execute
    pub command: String,
    /// Arguments, possibly containing `${…}` placeholders
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment, possibly containing `${…}` placeholders
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

/// Declaration of one user-configurable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfigSpec {
    /// Value type
    #[serde(rename = "type")]
    pub config_type: UserConfigType,
    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description shown to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the host must collect a value
    #[serde(default)]
    pub required: bool,
    /// Whether the value must be stored as a keychain reference
    #[serde(default)]
    pub sensitive: bool,
    /// Whether multiple values are allowed (string arrays)
    #[serde(default)]
    pub multiple: bool,
    /// Lower bound for number values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound for number values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Type of a user-configurable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserConfigType {
    /// Free-form string
    String,
    /// Number, optionally range-bounded
    Number,
    /// Boolean flag
    Boolean,
    /// Path that must name an existing directory
    Directory,
    /// Path that must name an existing file
    File,
}

impl UserConfigType {
    /// Whether values of this type are filesystem paths.
    pub fn is_path(self) -> bool {
        matches!(self, Self::Directory | Self::File)
    }
}

/// Host requirements of an extension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Compatibility {
    /// Supported platforms (`darwin`, `linux`, `win32`); empty means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,
    /// Required runtime version ranges, keyed by runtime name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtimes: Option<HashMap<String, String>>,
    /// Host application version range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Extra environment merged into the launch config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    /// Per-platform overrides of command/args/env
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_overrides: Option<HashMap<String, PlatformOverride>>,
}

/// Launch-config override for one platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformOverride {
    /// Replacement command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Replacement arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Environment merged over the base config's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

/// Read and decode `manifest.json` from an extracted extension directory.
///
/// # Errors
///
/// [`DxtError::ManifestRead`] when the file is missing or unreadable,
/// [`DxtError::ManifestParse`] when it does not decode.
pub fn load_manifest(dxt_root: &Path) -> DxtResult<DxtManifest> {
    let path = dxt_root.join(MANIFEST_FILE);
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| DxtError::ManifestRead(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw).map_err(|e| DxtError::ManifestParse(e.to_string()))
}

//! DXT error types.

use thiserror::Error;

use crate::semver::SemVerError;

/// A specialized `Result` type for DXT operations.
pub type DxtResult<T> = std::result::Result<T, DxtError>;

/// Errors raised while loading, validating, or launching an extension.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DxtError {
    /// `manifest.json` could not be read.
    #[error("Failed to read manifest: {0}")]
    ManifestRead(String),

    /// `manifest.json` could not be decoded.
    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    /// The host platform is not in the manifest's `platforms` list.
    #[error("Extension does not support platform '{platform}'")]
    UnsupportedPlatform {
        /// The host platform
        platform: String,
    },

    /// A declared runtime is missing or too old/new.
    #[error("Runtime '{runtime}' {problem}")]
    RuntimeIncompatible {
        /// Runtime name (`python`, `node`)
        runtime: String,
        /// What went wrong
        problem: String,
    },

    /// The host application version is outside the manifest's `context` range.
    #[error("Host application version {version} does not satisfy '{requirement}'")]
    ContextIncompatible {
        /// Host app version
        version: String,
        /// Declared range
        requirement: String,
    },

    /// A required user-config key was not provided.
    #[error("Missing required user config value '{key}'")]
    MissingUserConfig {
        /// The missing key
        key: String,
    },

    /// A sensitive value arrived inline instead of as a keychain reference.
    #[error("Sensitive user config value '{key}' must be a keychain reference")]
    SensitiveValueInlined {
        /// The offending key
        key: String,
    },

    /// A user-config value failed validation.
    #[error("Invalid user config value '{key}': {problem}")]
    InvalidUserConfig {
        /// The offending key
        key: String,
        /// What went wrong
        problem: String,
    },

    /// The entry point escapes the extension directory or is malformed.
    #[error("Invalid entry point '{entry_point}': {problem}")]
    InvalidEntryPoint {
        /// The declared entry point
        entry_point: String,
        /// What went wrong
        problem: String,
    },

    /// A keychain reference could not be resolved.
    #[error("Unresolvable keychain reference for '{key}'")]
    KeychainResolution {
        /// The config key whose value failed to resolve
        key: String,
    },

    /// Version or range parsing failed.
    #[error(transparent)]
    SemVer(#[from] SemVerError),

    /// Filesystem inspection failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

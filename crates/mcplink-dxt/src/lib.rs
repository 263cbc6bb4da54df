//! # Desktop Extension (DXT) Packaging
//!
//! Launches an MCP server out of an extracted desktop-extension directory:
//! read `manifest.json`, verify the host can run it (platform, runtime
//! versions, host-app version), validate the user's configuration, expand the
//! `${…}` substitution catalogue, and hand the result to the stdio transport
//! via the user's login shell.
//!
//! Secrets never pass through here in the clear: sensitive user-config values
//! must arrive as keychain references, resolved only at launch time through
//! the [`KeychainResolver`] interface the host provides.

pub mod semver;

mod compat;
mod error;
mod launcher;
mod manifest;
mod substitute;
mod user_config;

pub use compat::{CommandRuntimeProbe, FixedRuntimeProbe, RuntimeProbe, host_platform};
pub use error::{DxtError, DxtResult};
pub use launcher::{
    HostContext, launch_transport, prepare_launch, sh_quote, validate_entry_point,
};
pub use manifest::{
    Compatibility, DxtManifest, DxtServer, DxtServerType, MANIFEST_FILE, McpConfig,
    PlatformOverride, UserConfigSpec, UserConfigType, load_manifest,
};
pub use semver::{SemVer, SemVerError};
pub use substitute::{KeychainResolver, NoKeychain, SubstitutionContext};
pub use user_config::{UserConfig, UserConfigEntry, UserConfigValue, validate_user_config};

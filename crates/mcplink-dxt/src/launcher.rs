//! Turning a validated manifest into a launchable stdio server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use mcplink_stdio::{ServerProcessConfig, StdioTransport};

use crate::compat::{RuntimeProbe, check_compatibility, host_platform};
use crate::error::{DxtError, DxtResult};
use crate::manifest::{DxtManifest, DxtServerType, McpConfig};
use crate::semver::SemVer;
use crate::substitute::{KeychainResolver, SubstitutionContext};
use crate::user_config::{UserConfig, validate_user_config};

/// Facts about the hosting application.
#[derive(Debug, Clone)]
pub struct HostContext {
    /// Platform in manifest nomenclature (`darwin`, `linux`, `win32`)
    pub platform: String,
    /// Host application version, matched against `compatibility.context`
    pub app_version: SemVer,
}

impl HostContext {
    /// The running host with the given application version.
    #[must_use]
    pub fn current(app_version: SemVer) -> Self {
        Self {
            platform: host_platform().to_string(),
            app_version,
        }
    }
}

/// Quote a string for a POSIX shell: single quotes, with embedded single
/// quotes spliced as `'\''`.
#[must_use]
pub fn sh_quote(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('\'');
    for ch in input.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Validate the entry point and resolve it inside the extension directory.
///
/// Rejects absolute paths, `~` prefixes, and `..` components outright, then
/// canonicalizes both the root and the entry so a symlinked entry cannot
/// escape the extension. Binary servers must carry the executable bit.
///
/// # Errors
///
/// [`DxtError::InvalidEntryPoint`] naming the violated rule.
pub fn validate_entry_point(dxt_root: &Path, manifest: &DxtManifest) -> DxtResult<PathBuf> {
    let entry_point = &manifest.server.entry_point;
    let reject = |problem: &str| {
        Err(DxtError::InvalidEntryPoint {
            entry_point: entry_point.clone(),
            problem: problem.to_string(),
        })
    };

    let relative = Path::new(entry_point);
    if relative.is_absolute() {
        return reject("must be relative to the extension directory");
    }
    if entry_point.starts_with('~') {
        return reject("must not reference the home directory");
    }
    if relative
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return reject("must not contain '..'");
    }

    let canonical_root = std::fs::canonicalize(dxt_root).map_err(|e| {
        DxtError::InvalidEntryPoint {
            entry_point: entry_point.clone(),
            problem: format!("extension directory is unusable: {e}"),
        }
    })?;
    let canonical_entry = std::fs::canonicalize(canonical_root.join(relative))
        .map_err(|_| DxtError::InvalidEntryPoint {
            entry_point: entry_point.clone(),
            problem: "does not exist".to_string(),
        })?;

    if !canonical_entry.starts_with(&canonical_root) {
        return reject("escapes the extension directory");
    }

    if manifest.server.server_type == DxtServerType::Binary {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&canonical_entry)?.permissions().mode();
            if mode & 0o111 == 0 {
                return reject("binary entry point is not executable");
            }
        }
    }

    Ok(canonical_entry)
}

/// Build the final launch configuration for an extension.
///
/// Order of operations: compatibility check, user-config validation,
/// entry-point validation, platform override, substitution, placeholder
/// dropping, and finally wrapping the command in the user's login shell with
/// single-quoted arguments.
///
/// # Errors
///
/// Any validation failure from the steps above, as a [`DxtError`].
pub async fn prepare_launch(
    manifest: &DxtManifest,
    dxt_root: &Path,
    user_config: &UserConfig,
    host: &HostContext,
    probe: &dyn RuntimeProbe,
    resolver: &dyn KeychainResolver,
) -> DxtResult<ServerProcessConfig> {
    check_compatibility(
        manifest.compatibility.as_ref(),
        &host.platform,
        &host.app_version,
        probe,
    )
    .await?;
    validate_user_config(manifest, user_config)?;
    validate_entry_point(dxt_root, manifest)?;

    let mcp_config = apply_platform_override(manifest, &host.platform);

    let ctx = SubstitutionContext {
        dxt_root,
        user_config,
        resolver,
    };

    let command = ctx.substitute(&mcp_config.command)?;
    let args = ctx.substitute_args(&mcp_config.args)?;
    let env = ctx.substitute_env(&mcp_config.env)?;
    let working_directory = match &mcp_config.working_directory {
        Some(dir) => Some(PathBuf::from(ctx.substitute(dir)?)),
        None => None,
    };

    // The server runs under the user's login shell so it sees the same
    // environment an interactive terminal would.
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let mut command_line = sh_quote(&command);
    for arg in &args {
        command_line.push(' ');
        command_line.push_str(&sh_quote(arg));
    }
    debug!(%command_line, "prepared extension launch");

    let mut config = ServerProcessConfig::new(shell)
        .with_args(["-l".to_string(), "-c".to_string(), command_line]);
    config.env = env;
    config.working_directory = working_directory;
    Ok(config)
}

/// As [`prepare_launch`], returning a ready [`StdioTransport`].
///
/// # Errors
///
/// Same as [`prepare_launch`].
pub async fn launch_transport(
    manifest: &DxtManifest,
    dxt_root: &Path,
    user_config: &UserConfig,
    host: &HostContext,
    probe: &dyn RuntimeProbe,
    resolver: &dyn KeychainResolver,
) -> DxtResult<StdioTransport> {
    let config = prepare_launch(manifest, dxt_root, user_config, host, probe, resolver).await?;
    Ok(StdioTransport::new(config))
}

fn apply_platform_override(manifest: &DxtManifest, platform: &str) -> McpConfig {
    let mut config = manifest.server.mcp_config.clone();

    // Compatibility-level env is the base layer.
    if let Some(extra) = manifest
        .compatibility
        .as_ref()
        .and_then(|c| c.env.as_ref())
    {
        let mut merged: HashMap<String, String> = extra.clone();
        merged.extend(config.env);
        config.env = merged;
    }

    let Some(overrides) = manifest
        .compatibility
        .as_ref()
        .and_then(|c| c.platform_overrides.as_ref())
        .and_then(|map| map.get(platform))
    else {
        return config;
    };

    if let Some(command) = &overrides.command {
        config.command = command.clone();
    }
    if let Some(args) = &overrides.args {
        config.args = args.clone();
    }
    if let Some(env) = &overrides.env {
        config.env.extend(env.clone());
    }
    config
}

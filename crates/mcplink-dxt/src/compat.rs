//! Host compatibility checks: platform, runtimes, application version.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{DxtError, DxtResult};
use crate::manifest::Compatibility;
use crate::semver::SemVer;

/// How long a runtime gets to print its version.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The host platform in manifest nomenclature.
pub fn host_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(target_os = "windows") {
        "win32"
    } else {
        "linux"
    }
}

/// Reports installed runtime versions.
///
/// The real probe shells out to the runtimes; tests install a
/// [`FixedRuntimeProbe`].
#[async_trait]
pub trait RuntimeProbe: Send + Sync + std::fmt::Debug {
    /// The installed version of `runtime`, or `None` when not found.
    async fn version(&self, runtime: &str) -> Option<SemVer>;
}

/// Probes by invoking the runtime with `--version`.
///
/// `python` falls back to `python3` when the unversioned binary is absent.
#[derive(Debug, Default)]
pub struct CommandRuntimeProbe;

#[async_trait]
impl RuntimeProbe for CommandRuntimeProbe {
    async fn version(&self, runtime: &str) -> Option<SemVer> {
        let candidates: Vec<&str> = match runtime {
            "python" => vec!["python", "python3"],
            "node" => vec!["node"],
            other => vec![other],
        };

        for binary in candidates {
            let output = tokio::time::timeout(
                PROBE_TIMEOUT,
                tokio::process::Command::new(binary).arg("--version").output(),
            )
            .await;

            match output {
                Ok(Ok(out)) if out.status.success() => {
                    let text = String::from_utf8_lossy(&out.stdout).to_string()
                        + &String::from_utf8_lossy(&out.stderr);
                    if let Some(version) = extract_version(&text) {
                        debug!(runtime, binary, %version, "runtime probed");
                        return Some(version);
                    }
                    warn!(runtime, binary, "could not parse runtime version output");
                }
                Ok(Ok(_)) | Ok(Err(_)) => {}
                Err(_) => warn!(runtime, binary, "runtime version probe timed out"),
            }
        }
        None
    }
}

/// A probe with pinned answers. Test seam.
#[derive(Debug, Default)]
pub struct FixedRuntimeProbe(pub HashMap<String, SemVer>);

#[async_trait]
impl RuntimeProbe for FixedRuntimeProbe {
    async fn version(&self, runtime: &str) -> Option<SemVer> {
        self.0.get(runtime).cloned()
    }
}

/// Pull the first dotted number out of `python --version` / `node --version`
/// output (e.g. `Python 3.11.4`, `v20.3.1`).
pub(crate) fn extract_version(text: &str) -> Option<SemVer> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.trim_end_matches('.').parse().ok()
}

/// Verify the manifest's compatibility block against this host.
///
/// # Errors
///
/// [`DxtError::UnsupportedPlatform`], [`DxtError::RuntimeIncompatible`], or
/// [`DxtError::ContextIncompatible`] naming the first failed requirement.
pub async fn check_compatibility(
    compatibility: Option<&Compatibility>,
    platform: &str,
    host_version: &SemVer,
    probe: &dyn RuntimeProbe,
) -> DxtResult<()> {
    let Some(compat) = compatibility else {
        return Ok(());
    };

    if let Some(platforms) = &compat.platforms {
        if !platforms.iter().any(|p| p == platform) {
            return Err(DxtError::UnsupportedPlatform {
                platform: platform.to_string(),
            });
        }
    }

    if let Some(runtimes) = &compat.runtimes {
        for (runtime, requirement) in runtimes {
            let Some(installed) = probe.version(runtime).await else {
                return Err(DxtError::RuntimeIncompatible {
                    runtime: runtime.clone(),
                    problem: "is not installed".to_string(),
                });
            };
            if !installed.satisfies(requirement)? {
                return Err(DxtError::RuntimeIncompatible {
                    runtime: runtime.clone(),
                    problem: format!("version {installed} does not satisfy '{requirement}'"),
                });
            }
        }
    }

    if let Some(requirement) = &compat.context {
        if !host_version.satisfies(requirement)? {
            return Err(DxtError::ContextIncompatible {
                version: host_version.to_string(),
                requirement: requirement.clone(),
            });
        }
    }

    Ok(())
}

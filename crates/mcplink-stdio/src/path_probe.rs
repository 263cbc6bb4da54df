//! Login-shell PATH probing and merging.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// PATH entries appended when neither probe nor environment supplies them.
pub const FALLBACK_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// How long the login shell gets to print its environment.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Supplies the PATH a user's login shell would see.
///
/// The real probe spawns a shell, which is slow and environment-dependent;
/// tests install a [`FixedPathProbe`] instead.
#[async_trait]
pub trait PathProbe: Send + Sync + std::fmt::Debug {
    /// The login shell's PATH, or `None` when probing fails.
    async fn login_shell_path(&self) -> Option<String>;
}

/// Probes by running `$SHELL -l -c "env | grep '^PATH='"`.
#[derive(Debug, Default)]
pub struct LoginShellPathProbe;

#[async_trait]
impl PathProbe for LoginShellPathProbe {
    async fn login_shell_path(&self) -> Option<String> {
        let shell = std::env::var("SHELL").ok()?;

        let output = tokio::time::timeout(
            PROBE_TIMEOUT,
            tokio::process::Command::new(&shell)
                .arg("-l")
                .arg("-c")
                .arg("env | grep '^PATH='")
                .output(),
        )
        .await;

        match output {
            Ok(Ok(out)) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let path = stdout
                    .lines()
                    .find_map(|line| line.strip_prefix("PATH="))
                    .map(str::to_string);
                debug!(shell = %shell, found = path.is_some(), "login shell PATH probe");
                path
            }
            Ok(Ok(out)) => {
                warn!(shell = %shell, status = ?out.status, "login shell PATH probe failed");
                None
            }
            Ok(Err(e)) => {
                warn!(shell = %shell, error = %e, "could not spawn login shell");
                None
            }
            Err(_) => {
                warn!(shell = %shell, "login shell PATH probe timed out");
                None
            }
        }
    }
}

/// A probe returning a fixed answer. Test seam.
#[derive(Debug, Clone)]
pub struct FixedPathProbe(pub Option<String>);

#[async_trait]
impl PathProbe for FixedPathProbe {
    async fn login_shell_path(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Concatenate PATH sources into one colon-separated string, de-duplicating
/// entries while preserving first-occurrence order.
pub fn merge_path_segments(sources: &[Option<&str>]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut merged: Vec<&str> = Vec::new();

    for source in sources.iter().flatten() {
        for entry in source.split(':') {
            if !entry.is_empty() && seen.insert(entry) {
                merged.push(entry);
            }
        }
    }

    merged.join(":")
}

/// The PATH handed to spawned servers: probe result, process PATH, fallback.
pub async fn effective_path(probe: &dyn PathProbe) -> String {
    let shell_path = probe.login_shell_path().await;
    let process_path = std::env::var("PATH").ok();

    merge_path_segments(&[
        shell_path.as_deref(),
        process_path.as_deref(),
        Some(FALLBACK_PATH),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_preserves_order_and_dedupes() {
        let merged = merge_path_segments(&[
            Some("/a:/b:/c"),
            Some("/b:/d"),
            Some("/a:/e"),
        ]);
        assert_eq!(merged, "/a:/b:/c:/d:/e");
    }

    #[test]
    fn merge_skips_missing_sources_and_empty_entries() {
        let merged = merge_path_segments(&[None, Some(":/x::/y:"), None]);
        assert_eq!(merged, "/x:/y");
    }

    #[tokio::test]
    async fn effective_path_always_ends_with_fallback_entries() {
        let probe = FixedPathProbe(Some("/opt/custom/bin".into()));
        let path = effective_path(&probe).await;
        assert!(path.starts_with("/opt/custom/bin:"));
        for entry in FALLBACK_PATH.split(':') {
            assert!(path.split(':').any(|p| p == entry), "missing {entry}");
        }
    }

    #[tokio::test]
    async fn failed_probe_still_yields_a_usable_path() {
        let probe = FixedPathProbe(None);
        let path = effective_path(&probe).await;
        assert!(path.split(':').any(|p| p == "/usr/bin"));
    }
}

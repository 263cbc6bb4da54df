//! `${…}` placeholder substitution for launch configurations.
//!
//! The catalogue: `${__dirname}` (extension root), `${HOME}`, `${DESKTOP}`,
//! `${DOCUMENTS}`, `${DOWNLOADS}`, `${pathSeparator}` / `${/}`, and
//! `${user_config.KEY}`. User-config values may themselves contain
//! placeholders; recursion carries a visited set so a self-referential value
//! cannot loop. Arguments and environment values that still contain a
//! placeholder after substitution are dropped rather than handed to the
//! server verbatim.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DxtError, DxtResult};
use crate::manifest::UserConfigType;
use crate::user_config::{UserConfig, UserConfigValue};

/// Placeholder shape: `${name}` or `${name.sub}` with identifier segments.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*\}")
        .expect("placeholder regex")
});

static WHOLE_USER_CONFIG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$\{user_config\.([A-Za-z_][A-Za-z0-9_]*)\}$").expect("user config regex")
});

/// Resolves keychain references at launch time.
///
/// The keychain itself lives in the host application; this crate only ever
/// sees opaque references.
pub trait KeychainResolver: Send + Sync {
    /// The secret behind `reference`, or `None` when it cannot be resolved.
    fn resolve(&self, reference: &Uuid) -> Option<String>;
}

/// A resolver that knows no secrets.
#[derive(Debug, Default)]
pub struct NoKeychain;

impl KeychainResolver for NoKeychain {
    fn resolve(&self, _reference: &Uuid) -> Option<String> {
        None
    }
}

/// Where a value is headed; affects how string arrays flatten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Argument,
    Environment,
}

/// Everything substitution can draw on.
pub struct SubstitutionContext<'a> {
    /// The extension root (`${__dirname}`)
    pub dxt_root: &'a Path,
    /// Collected user configuration
    pub user_config: &'a UserConfig,
    /// Keychain backend
    pub resolver: &'a dyn KeychainResolver,
}

impl SubstitutionContext<'_> {
    /// Substitute a single string (command, working directory). Unknown
    /// placeholders are left in place.
    ///
    /// # Errors
    ///
    /// [`DxtError::KeychainResolution`] when a keychain reference cannot be
    /// resolved.
    pub fn substitute(&self, input: &str) -> DxtResult<String> {
        self.substitute_inner(input, Purpose::Argument, &mut HashSet::new())
    }

    /// Substitute an argument vector.
    ///
    /// An argument that consists solely of `${user_config.KEY}` where KEY is
    /// a string array expands into one argument per element. Arguments left
    /// with unresolved placeholders are dropped.
    ///
    /// # Errors
    ///
    /// [`DxtError::KeychainResolution`] as for [`Self::substitute`].
    pub fn substitute_args(&self, args: &[String]) -> DxtResult<Vec<String>> {
        let mut out = Vec::new();
        for arg in args {
            if let Some(captures) = WHOLE_USER_CONFIG_RE.captures(arg) {
                if let Some(entry) = self.user_config.get(&captures[1]) {
                    if let UserConfigValue::StringArray(items) = &entry.value {
                        out.extend(items.iter().cloned());
                        continue;
                    }
                }
            }

            let substituted =
                self.substitute_inner(arg, Purpose::Argument, &mut HashSet::new())?;
            if PLACEHOLDER_RE.is_match(&substituted) {
                debug!(arg, "dropping argument with unresolved placeholder");
                continue;
            }
            out.push(substituted);
        }
        Ok(out)
    }

    /// Substitute an environment map. Entries left with unresolved
    /// placeholders are dropped. String arrays join with `:` for
    /// file/directory values and `,` otherwise.
    ///
    /// # Errors
    ///
    /// [`DxtError::KeychainResolution`] as for [`Self::substitute`].
    pub fn substitute_env(
        &self,
        env: &HashMap<String, String>,
    ) -> DxtResult<HashMap<String, String>> {
        let mut out = HashMap::new();
        for (key, value) in env {
            let substituted =
                self.substitute_inner(value, Purpose::Environment, &mut HashSet::new())?;
            if PLACEHOLDER_RE.is_match(&substituted) {
                debug!(key, "dropping environment entry with unresolved placeholder");
                continue;
            }
            out.insert(key.clone(), substituted);
        }
        Ok(out)
    }

    fn substitute_inner(
        &self,
        input: &str,
        purpose: Purpose,
        visited: &mut HashSet<String>,
    ) -> DxtResult<String> {
        // `${/}` does not fit the identifier grammar; handle it directly.
        let input = input
            .replace("${/}", std::path::MAIN_SEPARATOR_STR);

        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for found in PLACEHOLDER_RE.find_iter(&input) {
            out.push_str(&input[last..found.start()]);
            let name = &input[found.start() + 2..found.end() - 1];
            match self.resolve(name, purpose, visited)? {
                Some(value) => out.push_str(&value),
                None => out.push_str(found.as_str()),
            }
            last = found.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }

    fn resolve(
        &self,
        name: &str,
        purpose: Purpose,
        visited: &mut HashSet<String>,
    ) -> DxtResult<Option<String>> {
        let value = match name {
            "__dirname" => Some(self.dxt_root.display().to_string()),
            "HOME" => dirs::home_dir().map(|p| p.display().to_string()),
            "DESKTOP" => dirs::desktop_dir().map(|p| p.display().to_string()),
            "DOCUMENTS" => dirs::document_dir().map(|p| p.display().to_string()),
            "DOWNLOADS" => dirs::download_dir().map(|p| p.display().to_string()),
            "pathSeparator" => Some(std::path::MAIN_SEPARATOR_STR.to_string()),
            _ => match name.strip_prefix("user_config.") {
                Some(key) => return self.resolve_user_config(name, key, purpose, visited),
                None => None,
            },
        };
        Ok(value)
    }

    fn resolve_user_config(
        &self,
        placeholder: &str,
        key: &str,
        purpose: Purpose,
        visited: &mut HashSet<String>,
    ) -> DxtResult<Option<String>> {
        if !visited.insert(placeholder.to_string()) {
            // Circular reference; leave the placeholder for the drop pass.
            return Ok(None);
        }

        let result = match self.user_config.get(key) {
            None => Ok(None),
            Some(entry) => {
                let raw = match &entry.value {
                    UserConfigValue::String(s) => s.clone(),
                    UserConfigValue::Number(n) => {
                        if n.fract() == 0.0 && n.is_finite() {
                            format!("{}", *n as i64)
                        } else {
                            n.to_string()
                        }
                    }
                    UserConfigValue::Boolean(b) => b.to_string(),
                    UserConfigValue::StringArray(items) => {
                        let separator = join_separator(purpose, entry.config_type);
                        items.join(separator)
                    }
                    UserConfigValue::KeychainRef(reference) => self
                        .resolver
                        .resolve(reference)
                        .ok_or_else(|| DxtError::KeychainResolution {
                            key: key.to_string(),
                        })?,
                };
                // Values may carry placeholders of their own.
                self.substitute_inner(&raw, purpose, visited).map(Some)
            }
        };

        visited.remove(placeholder);
        result
    }
}

fn join_separator(purpose: Purpose, config_type: UserConfigType) -> &'static str {
    match purpose {
        Purpose::Environment if config_type.is_path() => ":",
        _ => ",",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_config::UserConfigEntry;
    use pretty_assertions::assert_eq;

    struct TestKeychain;

    impl KeychainResolver for TestKeychain {
        fn resolve(&self, _reference: &Uuid) -> Option<String> {
            Some("s3cret".to_string())
        }
    }

    fn entry(value: UserConfigValue, config_type: UserConfigType) -> UserConfigEntry {
        UserConfigEntry {
            value,
            sensitive: false,
            config_type,
        }
    }

    fn config() -> UserConfig {
        let mut map = UserConfig::new();
        map.insert(
            "name".to_string(),
            entry(
                UserConfigValue::String("alice".to_string()),
                UserConfigType::String,
            ),
        );
        map.insert(
            "dirs".to_string(),
            entry(
                UserConfigValue::StringArray(vec!["/a".to_string(), "/b".to_string()]),
                UserConfigType::Directory,
            ),
        );
        map.insert(
            "port".to_string(),
            entry(UserConfigValue::Number(8080.0), UserConfigType::Number),
        );
        map.insert(
            "key".to_string(),
            entry(
                UserConfigValue::KeychainRef(Uuid::nil()),
                UserConfigType::String,
            ),
        );
        map.insert(
            "loop".to_string(),
            entry(
                UserConfigValue::String("${user_config.loop}".to_string()),
                UserConfigType::String,
            ),
        );
        map
    }

    #[test]
    fn dirname_and_user_config_substitute() {
        let user_config = config();
        let ctx = SubstitutionContext {
            dxt_root: Path::new("/ext/root"),
            user_config: &user_config,
            resolver: &TestKeychain,
        };

        assert_eq!(
            ctx.substitute("${__dirname}/server.js").unwrap(),
            "/ext/root/server.js"
        );
        assert_eq!(
            ctx.substitute("hello ${user_config.name}, port ${user_config.port}")
                .unwrap(),
            "hello alice, port 8080"
        );
    }

    #[test]
    fn path_separator_forms() {
        let user_config = UserConfig::new();
        let ctx = SubstitutionContext {
            dxt_root: Path::new("/x"),
            user_config: &user_config,
            resolver: &NoKeychain,
        };
        assert_eq!(ctx.substitute("a${/}b").unwrap(), format!("a{}b", std::path::MAIN_SEPARATOR));
        assert_eq!(
            ctx.substitute("a${pathSeparator}b").unwrap(),
            format!("a{}b", std::path::MAIN_SEPARATOR)
        );
    }

    #[test]
    fn whole_arg_string_array_expands_to_multiple_args() {
        let user_config = config();
        let ctx = SubstitutionContext {
            dxt_root: Path::new("/x"),
            user_config: &user_config,
            resolver: &NoKeychain,
        };

        let args = vec![
            "--dirs".to_string(),
            "${user_config.dirs}".to_string(),
            "--verbose".to_string(),
        ];
        assert_eq!(
            ctx.substitute_args(&args).unwrap(),
            vec!["--dirs", "/a", "/b", "--verbose"]
        );
    }

    #[test]
    fn embedded_string_array_joins_with_comma_in_args() {
        let user_config = config();
        let ctx = SubstitutionContext {
            dxt_root: Path::new("/x"),
            user_config: &user_config,
            resolver: &NoKeychain,
        };
        assert_eq!(
            ctx.substitute_args(&["--dirs=${user_config.dirs}".to_string()])
                .unwrap(),
            vec!["--dirs=/a,/b"]
        );
    }

    #[test]
    fn env_string_arrays_join_with_colon_for_path_types() {
        let user_config = config();
        let ctx = SubstitutionContext {
            dxt_root: Path::new("/x"),
            user_config: &user_config,
            resolver: &NoKeychain,
        };

        let mut env = HashMap::new();
        env.insert("ALLOWED".to_string(), "${user_config.dirs}".to_string());
        let out = ctx.substitute_env(&env).unwrap();
        assert_eq!(out["ALLOWED"], "/a:/b");
    }

    #[test]
    fn unresolved_args_and_env_are_dropped() {
        let user_config = config();
        let ctx = SubstitutionContext {
            dxt_root: Path::new("/x"),
            user_config: &user_config,
            resolver: &NoKeychain,
        };

        let args = vec![
            "keep".to_string(),
            "${user_config.missing}".to_string(),
            "also-${no_such_thing}".to_string(),
        ];
        assert_eq!(ctx.substitute_args(&args).unwrap(), vec!["keep"]);

        let mut env = HashMap::new();
        env.insert("GOOD".to_string(), "v".to_string());
        env.insert("BAD".to_string(), "${undefined_name}".to_string());
        let out = ctx.substitute_env(&env).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["GOOD"], "v");
    }

    #[test]
    fn circular_references_terminate_and_drop() {
        let user_config = config();
        let ctx = SubstitutionContext {
            dxt_root: Path::new("/x"),
            user_config: &user_config,
            resolver: &NoKeychain,
        };
        // The self-referential value never resolves; the arg is dropped.
        assert_eq!(
            ctx.substitute_args(&["${user_config.loop}".to_string()]).unwrap(),
            Vec::<String>::new()
        );
    }

    #[test]
    fn keychain_refs_resolve_through_the_backend() {
        let user_config = config();
        let ctx = SubstitutionContext {
            dxt_root: Path::new("/x"),
            user_config: &user_config,
            resolver: &TestKeychain,
        };
        assert_eq!(ctx.substitute("${user_config.key}").unwrap(), "s3cret");

        let failing = SubstitutionContext {
            dxt_root: Path::new("/x"),
            user_config: &user_config,
            resolver: &NoKeychain,
        };
        assert!(matches!(
            failing.substitute("${user_config.key}"),
            Err(DxtError::KeychainResolution { .. })
        ));
    }
}

//! User-provided configuration values and their validation.

use std::collections::HashMap;
use std::path::Path;

use uuid::Uuid;

use crate::error::{DxtError, DxtResult};
use crate::manifest::{DxtManifest, UserConfigType};

/// One value the host collected from the user.
#[derive(Debug, Clone, PartialEq)]
pub enum UserConfigValue {
    /// Free-form string
    String(String),
    /// Number
    Number(f64),
    /// Boolean flag
    Boolean(bool),
    /// Multiple strings (`multiple: true` declarations)
    StringArray(Vec<String>),
    /// Opaque reference into the host's keychain; never the secret itself
    KeychainRef(Uuid),
}

/// A collected value plus the declaration facts the launcher cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct UserConfigEntry {
    /// The value
    pub value: UserConfigValue,
    /// Whether the declaration marked it sensitive
    pub sensitive: bool,
    /// Declared type
    pub config_type: UserConfigType,
}

/// All collected values, keyed by declaration name.
pub type UserConfig = HashMap<String, UserConfigEntry>;

/// Validate collected values against the manifest's declarations.
///
/// Checks, in order per key: required keys are present; sensitive values are
/// keychain references (an inline secret is refused outright); numbers sit
/// within `[min, max]`; file/directory values point at an existing path of
/// the right kind.
///
/// # Errors
///
/// The first violated rule, as a [`DxtError`].
pub fn validate_user_config(manifest: &DxtManifest, values: &UserConfig) -> DxtResult<()> {
    for (key, spec) in &manifest.user_config {
        let Some(entry) = values.get(key) else {
            if spec.required {
                return Err(DxtError::MissingUserConfig { key: key.clone() });
            }
            continue;
        };

        if spec.sensitive && !matches!(entry.value, UserConfigValue::KeychainRef(_)) {
            return Err(DxtError::SensitiveValueInlined { key: key.clone() });
        }

        match (&entry.value, spec.config_type) {
            (UserConfigValue::Number(n), UserConfigType::Number) => {
                if let Some(min) = spec.min {
                    if *n < min {
                        return Err(DxtError::InvalidUserConfig {
                            key: key.clone(),
                            problem: format!("{n} is below the minimum {min}"),
                        });
                    }
                }
                if let Some(max) = spec.max {
                    if *n > max {
                        return Err(DxtError::InvalidUserConfig {
                            key: key.clone(),
                            problem: format!("{n} is above the maximum {max}"),
                        });
                    }
                }
            }
            (UserConfigValue::String(path), kind) if kind.is_path() => {
                check_path_kind(key, path, kind)?;
            }
            (UserConfigValue::StringArray(paths), kind) if kind.is_path() => {
                for path in paths {
                    check_path_kind(key, path, kind)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn check_path_kind(key: &str, path: &str, kind: UserConfigType) -> DxtResult<()> {
    let path = Path::new(path);
    let problem = match kind {
        UserConfigType::Directory if !path.is_dir() => Some("is not an existing directory"),
        UserConfigType::File if !path.is_file() => Some("is not an existing file"),
        _ => None,
    };
    match problem {
        Some(problem) => Err(DxtError::InvalidUserConfig {
            key: key.to_string(),
            problem: format!("'{}' {problem}", path.display()),
        }),
        None => Ok(()),
    }
}

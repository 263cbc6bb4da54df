//! Server process configuration.

use std::collections::HashMap;
use std::path::PathBuf;

/// How to launch a stdio MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerProcessConfig {
    /// Executable to run
    pub command: String,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Extra environment variables; merged over the inherited environment
    pub env: HashMap<String, String>,
    /// Working directory, when the server cares
    pub working_directory: Option<PathBuf>,
}

impl ServerProcessConfig {
    /// Configuration for `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

//! Command description handed to a [`ProcessSession`](super::ProcessSession).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use portable_pty::CommandBuilder;

use super::pty::SpawnError;

/// An external program invocation: argv, working directory and environment.
///
/// `argv[0]` is the executable. Environment overrides are merged over the
/// inherited environment unless [`Command::env_clear`] was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    clear_env: bool,
}

impl Command {
    /// Creates a command that runs `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            ..Self::default()
        }
    }

    /// Creates a command from a full argv vector.
    pub fn from_argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Overrides one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Starts the child from an empty environment instead of the inherited one.
    pub fn env_clear(mut self) -> Self {
        self.clear_env = true;
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn env_overrides(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn clears_env(&self) -> bool {
        self.clear_env
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// Renders the argv the way it is echoed into the console log.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }

    /// Builds the pty command, resolving the working directory against
    /// `default_cwd` and injecting `TERM` ahead of the caller's overrides.
    pub(crate) fn to_builder(
        &self,
        default_cwd: Option<&Path>,
        term: &str,
    ) -> Result<CommandBuilder, SpawnError> {
        let program = self.program().ok_or(SpawnError::EmptyCommand)?;

        let mut builder = CommandBuilder::new(program);
        builder.args(&self.argv[1..]);

        // portable-pty silently falls back to $HOME for a missing directory.
        if let Some(dir) = self.working_dir().or(default_cwd) {
            if !dir.is_dir() {
                return Err(SpawnError::WorkingDirectory(dir.to_path_buf()));
            }
            builder.cwd(dir);
        }

        if self.clear_env {
            builder.env_clear();
        }
        if !term.is_empty() {
            builder.env("TERM", term);
        }
        for (key, value) in &self.env {
            builder.env(key, value);
        }

        Ok(builder)
    }
}

impl<S: Into<String>> FromIterator<S> for Command {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_argv(iter)
    }
}

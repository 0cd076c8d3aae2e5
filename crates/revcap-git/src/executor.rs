// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! The git command collaborator
//!
//! Everything that talks to git goes through [`GitExecutor`], so the adapter
//! can be driven by the real git binary ([`CliGit`]) or by a scripted fake in
//! tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::GitError;

/// Per-invocation options for a git command
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Data written to the command's standard input
    pub stdin: Option<String>,
    /// Abort the command after this long
    pub timeout: Option<Duration>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl ExecOptions {
    /// Feed `input` to the command's standard input
    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Abort the command after `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set an environment variable for the command
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Runs git with an argument vector in a working directory and returns stdout.
#[async_trait]
pub trait GitExecutor: Send + Sync {
    /// Execute `git <args>` in `cwd`
    ///
    /// # Errors
    ///
    /// Returns [`GitError::CommandFailed`] on a non-zero exit,
    /// [`GitError::Spawn`] if git cannot be started and
    /// [`GitError::Timeout`] if the command exceeds its timeout.
    async fn execute(
        &self,
        cwd: &Path,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<String, GitError>;
}

/// [`GitExecutor`] backed by the git command-line binary
#[derive(Debug, Clone)]
pub struct CliGit {
    binary: PathBuf,
    default_timeout: Option<Duration>,
}

impl Default for CliGit {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            default_timeout: None,
        }
    }
}

impl CliGit {
    /// Use a specific git binary
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            default_timeout: None,
        }
    }

    /// Apply `timeout` to every command that does not set its own
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }
}

#[async_trait]
impl GitExecutor for CliGit {
    async fn execute(
        &self,
        cwd: &Path,
        args: &[String],
        options: &ExecOptions,
    ) -> Result<String, GitError> {
        let command = args.join(" ");
        debug!(cwd = %cwd.display(), "git {command}");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(if options.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(GitError::Spawn)?;
        if let Some(input) = &options.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(GitError::Spawn)?;
            // Closing stdin lets git see EOF.
            drop(stdin);
        }

        let output = match options.timeout.or(self.default_timeout) {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| GitError::Timeout {
                    command: command.clone(),
                    timeout,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(GitError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(%stderr, "git {command} exited with {}", output.status);
            return Err(GitError::CommandFailed { command, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

//! Async builder for running VCS client commands.
//!
//! Every backend (git, hg, svn, bzr) goes through [`VcsCommand`], so all of
//! them share the same timeout handling, logging and error mapping. Commands
//! run with `tokio::process` and never block a worker thread.
//!
//! ```rust,no_run
//! use grove::vcs::{VcsKind, command::VcsCommand};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let head = VcsCommand::new(VcsKind::Git)
//!     .args(["rev-parse", "HEAD"])
//!     .current_dir("/path/to/checkout")
//!     .with_context("github.com/pkg/errors")
//!     .execute_stdout()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Log output goes to the `vcs` target; commands slower than 100ms are also
//! reported under `vcs::perf`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

use super::VcsKind;
use crate::constants::DEFAULT_COMMAND_TIMEOUT;
use crate::core::GroveError;

/// A single invocation of a VCS client.
pub struct VcsCommand {
    kind: VcsKind,
    program: &'static str,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Option<Duration>,
    context: Option<String>,
}

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct VcsCommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl VcsCommand {
    pub fn new(kind: VcsKind) -> Self {
        Self {
            kind,
            program: kind.command(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: Some(DEFAULT_COMMAND_TIMEOUT),
            context: None,
        }
    }

    /// Run a companion executable of the same client (e.g. `svnversion`).
    #[must_use]
    pub const fn program(mut self, program: &'static str) -> Self {
        self.program = program;
        self
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Set a custom timeout for the command (None for no timeout).
    #[must_use]
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Tag log lines with a dependency name.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn operation(&self) -> String {
        self.args.first().cloned().unwrap_or_else(|| "unknown".to_string())
    }

    fn prefix(&self) -> String {
        self.context.as_ref().map(|c| format!("({c}) ")).unwrap_or_default()
    }

    /// Run the command and capture its output, whatever the exit status.
    ///
    /// Fails only when the client cannot be started or times out.
    pub async fn run(self) -> Result<VcsCommandOutput> {
        let start = Instant::now();
        let program = self.program;
        let prefix = self.prefix();
        let mut cmd = Command::new(program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            // A missing cwd would otherwise surface as a missing client
            if !dir.is_dir() {
                anyhow::bail!("Working directory does not exist: {}", dir.display());
            }
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "vcs", "Setting env var: {}={}", key, value);
            cmd.env(key, value);
        }
        // Never block on a credential prompt
        if self.kind == VcsKind::Git {
            cmd.env("GIT_TERMINAL_PROMPT", "0");
        }

        tracing::debug!(target: "vcs", "{}Executing command: {} {}", prefix, program, self.args.join(" "));

        let output_future = cmd.output();
        let spawned = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "vcs",
                        "{}Command timed out after {} seconds: {} {}",
                        prefix,
                        duration.as_secs(),
                        program,
                        self.args.join(" ")
                    );
                    return Err(GroveError::VcsCommandError {
                        vcs: program.to_string(),
                        operation: self.operation(),
                        stderr: format!(
                            "{program} command timed out after {} seconds. \
                            Try running it manually: {program} {}",
                            duration.as_secs(),
                            self.args.join(" ")
                        ),
                    }
                    .into());
                }
            },
            None => output_future.await,
        };

        let output = match spawned {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GroveError::VcsNotFound {
                    vcs: program.to_string(),
                }
                .into());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to execute {program} {}", self.args.join(" ")));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            tracing::debug!(target: "vcs", "{}Command failed with exit code: {:?}", prefix, output.status.code());
            if !stderr.is_empty() {
                tracing::debug!(target: "vcs", "{}Error: {}", prefix, stderr.trim());
            }
        } else if !stdout.trim().is_empty() {
            tracing::trace!(target: "vcs", "{}{}", prefix, stdout.trim());
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(target: "vcs::perf", "{}{} {} took {:.2}s", prefix, program, self.operation(), elapsed.as_secs_f64());
        } else if elapsed.as_millis() > 100 {
            tracing::debug!(target: "vcs::perf", "{}{} {} took {}ms", prefix, program, self.operation(), elapsed.as_millis());
        }

        Ok(VcsCommandOutput {
            success: output.status.success(),
            stdout,
            stderr,
        })
    }

    /// Run the command; a non-zero exit becomes [`GroveError::VcsCommandError`].
    pub async fn execute(self) -> Result<VcsCommandOutput> {
        let vcs = self.program.to_string();
        let operation = self.operation();
        let output = self.run().await?;
        if !output.success {
            let stderr = if output.stderr.trim().is_empty() {
                output.stdout.clone()
            } else {
                output.stderr.clone()
            };
            return Err(GroveError::VcsCommandError {
                vcs,
                operation,
                stderr,
            }
            .into());
        }
        Ok(output)
    }

    /// Run the command and return trimmed stdout.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }

    /// Run the command and report only whether it exited successfully.
    pub async fn succeeds(self) -> Result<bool> {
        Ok(self.run().await?.success)
    }
}

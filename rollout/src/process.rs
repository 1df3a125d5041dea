//! External tool invocation
//!
//! Every git, firebase and npm call goes through [`CommandRunner`]. A runner
//! returns the captured `{stdout, stderr, exit_code}` for any process that was
//! launched; only a failure to launch, a timeout or a cancellation is an error.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors raised at the process boundary
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {after:?}")]
    TimedOut { command: String, after: Duration },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
}

/// A single external command
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Option<Duration>,
    /// Kills the process when cancelled
    pub cancel: Option<CancellationToken>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout: None,
            cancel: None,
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Clamp the timeout so it never exceeds `limit`
    pub fn clamp_timeout(mut self, limit: Option<Duration>) -> Self {
        if let Some(limit) = limit {
            self.timeout = Some(match self.timeout {
                Some(t) => t.min(limit),
                None => limit,
            });
        }
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Command line as a human would type it
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a launched process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Best available failure text: stderr, else stdout, else the exit code
    pub fn failure_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external commands one at a time
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

/// Runner backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let command_line = spec.command_line();
        debug!("Executing: {}", command_line);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        // Dropping the output future kills the child
        let child = async {
            match spec.timeout {
                Some(after) => tokio::time::timeout(after, command.output())
                    .await
                    .map_err(|_| ProcessError::TimedOut {
                        command: command_line.clone(),
                        after,
                    })?,
                None => command.output().await,
            }
            .map_err(|source| ProcessError::Spawn {
                command: command_line.clone(),
                source,
            })
        };

        let output = match &spec.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    warn!("Cancelled: {}", command_line);
                    return Err(ProcessError::Cancelled {
                        command: command_line.clone(),
                    });
                }
                output = child => output?,
            },
            None => child.await?,
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

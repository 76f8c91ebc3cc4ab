//! Code execution through an external interpreter.

use std::{io, process::Stdio, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::command::{CommandBuildError, CommandBuilder};

pub const ENV_INTERPRETER: &str = "RUNNER_INTERPRETER";
pub const ENV_EXEC_TIMEOUT_SECS: &str = "RUNNER_EXEC_TIMEOUT_SECS";

/// Captured result of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
}

/// Runner error.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Command error: {0}")]
    Command(#[from] CommandBuildError),
    #[error("Spawn failed: {0}")]
    SpawnFailed(io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Execution timed out after {0:?}")]
    TimedOut(Duration),
}

/// Trait for code execution backends.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Execute `code` to completion and capture its output.
    async fn run(&self, code: &str) -> Result<ExecutionOutput, RunnerError>;
}

/// Runs code by piping it to an interpreter's stdin.
#[derive(Debug, Clone, Default)]
pub struct InterpreterRunner {
    command: CommandBuilder,
    timeout: Option<Duration>,
}

impl InterpreterRunner {
    #[must_use]
    pub const fn new(command: CommandBuilder) -> Self {
        Self {
            command,
            timeout: None,
        }
    }

    /// Kill executions that run longer than `limit`.
    #[must_use]
    pub const fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Configure from `RUNNER_INTERPRETER` and `RUNNER_EXEC_TIMEOUT_SECS`.
    #[must_use]
    pub fn from_env() -> Self {
        let command = std::env::var(ENV_INTERPRETER)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map_or_else(CommandBuilder::default, CommandBuilder::new);

        let runner = Self::new(command);
        match std::env::var(ENV_EXEC_TIMEOUT_SECS) {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => runner.with_timeout(Duration::from_secs(secs)),
                _ => {
                    tracing::warn!("Ignoring invalid {ENV_EXEC_TIMEOUT_SECS}={raw:?}");
                    runner
                }
            },
            Err(_) => runner,
        }
    }

    #[must_use]
    pub const fn command(&self) -> &CommandBuilder {
        &self.command
    }
}

#[async_trait]
impl CodeRunner for InterpreterRunner {
    async fn run(&self, code: &str) -> Result<ExecutionOutput, RunnerError> {
        let (program, args) = self.command.build()?.into_resolved()?;
        tracing::debug!(program = %program.display(), bytes = code.len(), "Executing code");

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RunnerError::SpawnFailed)?;

        let stdin = child.stdin.take();
        let source = code.to_owned();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(source.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, io::Error>(())
        };

        let execution = async { tokio::join!(feed, child.wait_with_output()) };
        let (fed, output) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .map_err(|_| RunnerError::TimedOut(limit))?,
            None => execution.await,
        };

        // The interpreter may exit before reading everything.
        if let Err(e) = fed {
            if e.kind() != io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }

        let output = output?;
        Ok(ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

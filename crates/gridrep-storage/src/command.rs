//! The grid middleware command boundary.
//!
//! Every backend operation ultimately runs a middleware command (gfal and
//! friends) and reads back exit status, stdout and stderr. `CommandRunner`
//! is the seam: production uses [`SubprocessRunner`], tests inject scripted
//! runners. Adapters classify failed invocations through
//! [`classify_failure`] so raw exit codes never travel upward.

use async_trait::async_trait;

use crate::error::{Result, StorageError};

/// Captured result of one middleware command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit status; zero is success.
    pub status: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited cleanly.
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// The stream worth quoting in an error: stderr, or stdout when the
    /// command wrote its complaint there instead.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Runs middleware commands. Object-safe so engines and adapters can hold
/// `Arc<dyn CommandRunner>` and tests can script the middleware away.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capturing output. An `Err` here means
    /// the command could not be run at all; a non-zero exit is a normal
    /// `Ok` carrying the status.
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Production runner over `tokio::process`.
pub struct SubprocessRunner;

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(program, ?args, "running grid command");
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StorageError::BackendUnavailable {
                reason: format!("failed to spawn {}: {}", program, e),
            })?;
        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Translate a failed command invocation into the error taxonomy.
///
/// Pattern matching on middleware diagnostics is what the tools give us;
/// anything unrecognised stays a transient `CommandFailed` so the retry
/// policy gets a chance at flaky endpoints.
pub fn classify_failure(program: &str, output: &CommandOutput) -> StorageError {
    let diag = output.diagnostic();
    let lower = diag.to_ascii_lowercase();
    if lower.contains("no such file") || lower.contains("does not exist") {
        StorageError::NotFound {
            what: diag.to_string(),
        }
    } else if lower.contains("permission denied")
        || lower.contains("authorization")
        || lower.contains("authentication")
        || lower.contains("credential")
        || lower.contains("proxy")
    {
        StorageError::AccessDenied {
            what: diag.to_string(),
        }
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("could not connect")
        || lower.contains("service unavailable")
    {
        StorageError::BackendUnavailable {
            reason: diag.to_string(),
        }
    } else {
        StorageError::CommandFailed {
            program: program.to_string(),
            detail: diag.to_string(),
        }
    }
}

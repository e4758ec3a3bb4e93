//! Shell command execution
//!
//! External collaborators (compose, the k3s installer, kubectl, firewall
//! tools) are all driven through [`CommandRunner`]. Commands are full shell
//! lines so pipes and `&&` chains work the same on every host.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Errors that can occur while running an external command
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("`{command}` exited with code {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run printing `stdout`
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stdout
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a shell command line to completion and capture its output.
    ///
    /// A non-zero exit is reported through [`CommandOutput::success`], not as
    /// an error; `Err` means the command could not be started at all.
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecError>;
}

/// Run a command and treat a non-zero exit as an error.
///
/// Returns the trimmed stdout on success.
pub async fn run_checked(runner: &dyn CommandRunner, command: &str) -> Result<String, ExecError> {
    let output = runner.run(command).await?;
    if output.success {
        Ok(output.text().to_string())
    } else {
        Err(ExecError::Failed {
            command: command.to_string(),
            code: output.code.unwrap_or(-1),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

// ============================================================================
// SBIO: I/O implementation (real shell)
// ============================================================================

/// Runs commands through the host shell (`sh -c` or `cmd /C`)
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn shell(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecError> {
        debug!("Running: {}", command);

        let output = Self::shell(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ExecError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if result.success {
            debug!("Command output: {}", result.text());
        } else {
            warn!(
                "Command `{}` exited with code {}: {}",
                command,
                result.code.unwrap_or(-1),
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}

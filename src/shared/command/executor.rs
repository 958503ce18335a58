//! Command execution utilities
//!
//! This module provides the `CommandExecutor` struct for executing external commands
//! with proper error handling, logging, and output capture. Credentials are passed
//! to child processes as environment variables and never appear in log output.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use super::error::CommandError;
use super::result::CommandResult;

/// An environment variable handed to a child process
///
/// Variables marked `secret` are injected into the child environment but
/// logged as `***` so credentials never reach log files.
#[derive(Debug, Clone)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
    pub secret: bool,
}

impl EnvVar {
    /// A plain, loggable environment variable
    #[must_use]
    pub fn plain<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret: false,
        }
    }

    /// A credential-carrying environment variable, redacted in logs
    #[must_use]
    pub fn secret<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            secret: true,
        }
    }
}

/// A command executor that can run external commands
#[derive(Debug, Default)]
pub struct CommandExecutor {}

impl CommandExecutor {
    /// Creates a new `CommandExecutor`
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }

    /// Runs a command with the given arguments and optional working directory
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// * The working directory does not exist - `CommandError::StartupFailed`
    /// * The command cannot be started (e.g., command not found) - `CommandError::StartupFailed`
    /// * The command exits with a non-zero code - `CommandError::ExecutionFailed`
    pub fn run_command(
        &self,
        cmd: &str,
        args: &[&str],
        working_dir: Option<&Path>,
    ) -> Result<CommandResult, CommandError> {
        self.run_command_with_env(cmd, args, &[], working_dir)
    }

    /// Runs a command with extra environment variables
    ///
    /// The variables are appended to the inherited process environment.
    /// Secret variables are logged redacted.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`run_command`](Self::run_command).
    pub fn run_command_with_env(
        &self,
        cmd: &str,
        args: &[&str],
        env: &[EnvVar],
        working_dir: Option<&Path>,
    ) -> Result<CommandResult, CommandError> {
        let mut command = Command::new(cmd);
        let command_display = format!("{} {}", cmd, args.join(" "));

        command.args(args);

        for var in env {
            command.env(&var.key, &var.value);
        }

        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        info!(
            operation = "command_execution",
            command = %command_display,
            env = %Self::display_env(env),
            "Running command"
        );

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| CommandError::StartupFailed {
                command: command_display.clone(),
                source,
            })?;

        let result = CommandResult::from_output(&output);

        if !output.status.success() {
            let exit_code = result
                .exit_code()
                .map_or_else(|| "unknown".to_string(), |code| code.to_string());

            return Err(CommandError::ExecutionFailed {
                command: command_display,
                exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        if !result.stdout_trimmed().is_empty() {
            tracing::debug!(
                operation = "command_execution",
                command = %command_display,
                "stdout: {}",
                result.stdout_trimmed()
            );
        }

        if !result.stderr_trimmed().is_empty() {
            tracing::debug!(
                operation = "command_execution",
                command = %command_display,
                "stderr: {}",
                result.stderr_trimmed()
            );
        }

        Ok(result)
    }

    fn display_env(env: &[EnvVar]) -> String {
        env.iter()
            .map(|var| {
                if var.secret {
                    format!("{}=***", var.key)
                } else {
                    format!("{}={}", var.key, var.value)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

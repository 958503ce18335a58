//! Command execution error types
//!
//! This module provides error types for command execution failures,
//! including startup errors and execution errors with detailed context.

use thiserror::Error;

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// The command could not be started (e.g., command not found, permission denied)
    #[error("Failed to start command '{command}': {source}")]
    StartupFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command was started but exited with a non-zero status code
    #[error(
        "Command '{command}' failed with exit code {exit_code}\nStdout: {stdout}\nStderr: {stderr}"
    )]
    ExecutionFailed {
        command: String,
        exit_code: String,
        stdout: String,
        stderr: String,
    },
}

impl CommandError {
    /// The stderr captured from a failed execution, if any
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::StartupFailed { .. } => None,
            Self::ExecutionFailed { stderr, .. } => Some(stderr),
        }
    }
}

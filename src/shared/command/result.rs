//! Captured output of a finished tool invocation
//!
//! Every external tool this crate drives (`govc`, `xorriso`, `genisoimage`,
//! `talosctl`, `ssh-keyscan`) talks back over stdout in one of two shapes: a
//! single scalar (`object.collect -s`, `device.cdrom.add`) or a list of
//! lines (`find`, `device.ls`, `ssh-keyscan`). `CommandResult` captures the
//! raw streams once and gives the adapters those two views, so the
//! trim/filter dance is not repeated at every call site.

use std::process::Output;

/// What a finished command left behind
#[derive(Debug, Clone)]
pub struct CommandResult {
    exit_code: Option<i32>,

    /// Raw standard output
    pub stdout: String,

    /// Raw standard error
    pub stderr: String,
}

impl CommandResult {
    /// Capture a finished process, converting the streams lossily to UTF-8
    #[must_use]
    pub fn from_output(output: &Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    /// The exit code, when the process exited normally
    ///
    /// `None` means the process died to a signal before exiting.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Stdout as a single scalar: trimmed of surrounding whitespace
    ///
    /// The shape `govc object.collect -s` and `device.cdrom.add` produce.
    #[must_use]
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Stdout as a listing: trimmed, non-empty lines in order
    ///
    /// The shape `govc find` and `device.ls` produce. Blank lines and
    /// trailing newlines disappear; an empty listing yields an empty vector.
    #[must_use]
    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Stderr trimmed of surrounding whitespace, for log lines
    #[must_use]
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

#[cfg(test)]
mod tests {
    use std::process::{Command, Stdio};

    use super::*;

    fn run(script: &str) -> CommandResult {
        let output = Command::new("sh")
            .args(["-c", script])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .expect("sh should be runnable in the test environment");
        CommandResult::from_output(&output)
    }

    #[test]
    fn it_should_expose_a_scalar_stdout_without_the_trailing_newline() {
        // the shape of `govc object.collect -s vm/web-01 runtime.powerState`
        let result = run("printf 'poweredOn\\n'");

        assert_eq!(result.exit_code(), Some(0));
        assert_eq!(result.stdout_trimmed(), "poweredOn");
    }

    #[test]
    fn it_should_expose_a_listing_without_blank_lines() {
        // the shape of `govc find -type m`, including a stray blank line
        let result = run("printf '/DC1/vm/web-01\\n\\n  /DC1/vm/web-02\\n'");

        assert_eq!(
            result.stdout_lines(),
            vec!["/DC1/vm/web-01", "/DC1/vm/web-02"]
        );
    }

    #[test]
    fn it_should_yield_an_empty_listing_for_no_output() {
        let result = run("true");

        assert!(result.stdout_lines().is_empty());
        assert_eq!(result.stdout_trimmed(), "");
    }

    #[test]
    fn it_should_keep_the_exit_code_and_stderr_of_a_failed_command() {
        let result = run("printf 'not found\\n' >&2; exit 3");

        assert_eq!(result.exit_code(), Some(3));
        assert_eq!(result.stderr_trimmed(), "not found");
    }
}

//! SSH host key fingerprint probe
//!
//! Used by the CLI after a successful bootstrap to fill the
//! `ssh_host_fingerprint` field of the bootstrap result. Scans the host key
//! with `ssh-keyscan` and renders the `SHA256:` fingerprint with
//! `ssh-keygen -lf`.

use std::io::Write;
use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{debug, info};

use crate::shared::{CommandError, CommandExecutor};

/// Errors from the fingerprint probe
#[derive(Debug, Error)]
pub enum HostKeyError {
    #[error("host key scan failed: {0}")]
    Scan(#[from] CommandError),

    #[error("failed to stage scanned host keys: {0}")]
    Staging(#[from] std::io::Error),
}

/// Probes a host's SSH key fingerprint
#[derive(Debug, Default)]
pub struct HostKeyScanner {
    executor: CommandExecutor,
}

impl HostKeyScanner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            executor: CommandExecutor::new(),
        }
    }

    /// Probe the `SHA256:` fingerprint of the host key at `ip:port`
    ///
    /// Returns `Ok(None)` when the host offered no keys; fingerprint probing
    /// is best-effort and the caller treats `None` as "omit the field".
    ///
    /// # Errors
    ///
    /// Returns an error when the scan tooling itself fails.
    pub fn fingerprint(&self, ip: Ipv4Addr, port: u16) -> Result<Option<String>, HostKeyError> {
        let ip_str = ip.to_string();
        let port_str = port.to_string();

        let scan = self.executor.run_command(
            "ssh-keyscan",
            &["-p", &port_str, "-T", "5", &ip_str],
            None,
        )?;

        if scan.stdout_trimmed().is_empty() {
            debug!(operation = "host_key_probe", %ip, "Host offered no keys");
            return Ok(None);
        }

        let mut keys_file = tempfile::NamedTempFile::new()?;
        keys_file.write_all(scan.stdout.as_bytes())?;

        let keys_path = keys_file.path().display().to_string();
        let rendered = self
            .executor
            .run_command("ssh-keygen", &["-lf", &keys_path], None)?;

        let fingerprint = extract_sha256_fingerprint(&rendered.stdout);
        if let Some(fingerprint) = &fingerprint {
            info!(
                operation = "host_key_probe",
                %ip,
                fingerprint = %fingerprint,
                "Host key fingerprint probed"
            );
        }
        Ok(fingerprint)
    }
}

/// First `SHA256:` token in `ssh-keygen -lf` output
fn extract_sha256_fingerprint(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find(|token| token.starts_with("SHA256:"))
        .map(ToString::to_string)
}

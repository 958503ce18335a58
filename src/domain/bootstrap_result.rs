//! Bootstrap result contract
//!
//! After a successful bootstrap the CLI writes a small file describing how to
//! reach the finished VM over SSH. Downstream stages (configuration
//! management, cluster joins) consume this file instead of re-deriving
//! connection details from the VM configuration.
//!
//! The format is selected by the path extension: `.yaml`/`.yml` for YAML,
//! `.json` for JSON. The file carries credentials-adjacent data (key path,
//! fingerprint), so it is written with mode `0600`.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default SSH port substituted for a missing or zero `ssh_port`
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How to reach a bootstrapped VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapResult {
    /// VM inventory name
    pub vm_name: String,

    /// Guest IPv4 address
    pub ip: String,

    /// Account to connect as
    pub ssh_user: String,

    /// Path to the private key matching an authorized public key
    pub ssh_key_path: String,

    /// SSH port; 0 is normalized to 22 on load
    #[serde(default)]
    pub ssh_port: u16,

    /// Host key fingerprint in `SHA256:...` form, when probed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_host_fingerprint: Option<String>,
}

/// Errors for saving/loading a `BootstrapResult`
#[derive(Debug, Error)]
pub enum BootstrapResultError {
    #[error("required field '{field}' is missing or empty")]
    MissingField { field: &'static str },

    #[error("'{value}' is not a valid IPv4 address")]
    InvalidIp { value: String },

    #[error("ssh_host_fingerprint must start with 'SHA256:', got '{value}'")]
    InvalidFingerprint { value: String },

    #[error("unsupported result file extension '{extension}' (expected yaml, yml, or json)")]
    UnsupportedExtension { extension: String },

    #[error("failed to serialize bootstrap result: {0}")]
    Serialize(String),

    #[error("failed to parse bootstrap result from '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("failed to write bootstrap result to '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read bootstrap result from '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultFormat {
    Yaml,
    Json,
}

impl ResultFormat {
    fn from_path(path: &Path) -> Result<Self, BootstrapResultError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(BootstrapResultError::UnsupportedExtension {
                extension: other.to_string(),
            }),
        }
    }
}

impl BootstrapResult {
    /// Validate the contract invariants
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant: a missing required field, an
    /// unparsable IP, or a fingerprint without the `SHA256:` prefix.
    pub fn validate(&self) -> Result<(), BootstrapResultError> {
        for (field, value) in [
            ("vm_name", &self.vm_name),
            ("ip", &self.ip),
            ("ssh_user", &self.ssh_user),
            ("ssh_key_path", &self.ssh_key_path),
        ] {
            if value.trim().is_empty() {
                return Err(BootstrapResultError::MissingField { field });
            }
        }

        self.ip
            .parse::<Ipv4Addr>()
            .map_err(|_| BootstrapResultError::InvalidIp {
                value: self.ip.clone(),
            })?;

        if let Some(fingerprint) = &self.ssh_host_fingerprint {
            if !fingerprint.starts_with("SHA256:") {
                return Err(BootstrapResultError::InvalidFingerprint {
                    value: fingerprint.clone(),
                });
            }
        }

        Ok(())
    }

    /// Substitute the default port for a zero `ssh_port`
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.ssh_port == 0 {
            self.ssh_port = DEFAULT_SSH_PORT;
        }
        self
    }

    /// Write the result to `path`, format chosen by extension
    ///
    /// The parent directory is created with mode `0755`; the file itself is
    /// written with mode `0600`.
    ///
    /// # Errors
    ///
    /// Refuses to write a value that fails [`validate`](Self::validate);
    /// also fails on an unsupported extension or an I/O error.
    pub fn save(&self, path: &Path) -> Result<(), BootstrapResultError> {
        self.validate()?;
        let format = ResultFormat::from_path(path)?;

        let serialized = match format {
            ResultFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|e| BootstrapResultError::Serialize(e.to_string()))?,
            ResultFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| BootstrapResultError::Serialize(e.to_string()))?,
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            create_dir_all_0755(parent).map_err(|source| BootstrapResultError::Write {
                path: parent.display().to_string(),
                source,
            })?;
        }

        write_0600(path, serialized.as_bytes()).map_err(|source| BootstrapResultError::Write {
            path: path.display().to_string(),
            source,
        })?;

        Ok(())
    }

    /// Load and validate a result from `path`, normalizing the port
    ///
    /// # Errors
    ///
    /// Fails on unsupported extension, unreadable file, parse error, or a
    /// value that fails [`validate`](Self::validate) after normalization.
    pub fn load(path: &Path) -> Result<Self, BootstrapResultError> {
        let format = ResultFormat::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|source| BootstrapResultError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let result: Self = match format {
            ResultFormat::Yaml => {
                serde_yaml::from_str(&content).map_err(|e| BootstrapResultError::Parse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
            }
            ResultFormat::Json => {
                serde_json::from_str(&content).map_err(|e| BootstrapResultError::Parse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
            }
        };

        let result = result.normalized();
        result.validate()?;
        Ok(result)
    }
}

#[cfg(unix)]
fn create_dir_all_0755(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    use std::os::unix::fs::PermissionsExt;
    if path.exists() {
        return Ok(());
    }
    fs::DirBuilder::new().recursive(true).mode(0o755).create(path)?;
    // The builder mode is subject to the umask; pin the leaf explicitly.
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn create_dir_all_0755(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn write_0600(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_0600(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    fs::write(path, contents)
}

//! OS profile configuration
//!
//! A bootstrap run installs exactly one OS profile. Profiles are modeled as a
//! tagged variant: each carries its own subconfig, and the provisioning
//! behavior for a profile lives in the matching
//! `application::provisioners` implementation.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// OS profile with per-profile configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Profile {
    /// Ubuntu Server, installed unattended via cloud-init NoCloud autoinstall
    Ubuntu(UbuntuProfile),
    /// Talos Linux, deployed as an immutable OVA from the Image Factory
    Talos(TalosProfile),
}

impl Profile {
    /// Short profile identifier used in logs and install-stats keys
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ubuntu(_) => "ubuntu",
            Self::Talos(_) => "talos",
        }
    }

    /// OS version string for this profile
    #[must_use]
    pub fn os_version(&self) -> &str {
        match self {
            Self::Ubuntu(ubuntu) => &ubuntu.version,
            Self::Talos(talos) => &talos.version,
        }
    }
}

/// Ubuntu profile subconfig
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UbuntuProfile {
    /// Ubuntu release, e.g. "24.04"
    pub version: String,

    /// Account created by the autoinstall identity section
    pub username: String,

    /// Authorized SSH public keys for the account
    #[serde(default)]
    pub ssh_public_keys: Vec<String>,

    /// Plaintext password; hashed with bcrypt before it reaches cloud-init
    #[serde(default, skip_serializing)]
    pub plaintext_password: Option<SecretString>,

    /// Precomputed password hash; takes precedence over the plaintext
    #[serde(default)]
    pub password_hash: Option<String>,

    /// Whether sshd accepts password authentication for the account
    #[serde(default)]
    pub allow_password_ssh: bool,
}

impl UbuntuProfile {
    /// Whether any password source (plaintext or precomputed hash) is configured
    #[must_use]
    pub fn has_password_source(&self) -> bool {
        self.plaintext_password.is_some() || self.password_hash.is_some()
    }
}

/// Talos profile subconfig
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalosProfile {
    /// Talos release, e.g. "v1.8.1"
    pub version: String,

    /// Image Factory schematic ID pinning the system extension set
    pub schematic_id: String,
}

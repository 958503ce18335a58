//! Bootstrap error taxonomy
//!
//! One variant per failure class of the workflow. Variants up to and
//! including `NotFound` occur before any hardware exists, so they carry no
//! cleanup obligation; everything after runs the cleanup path unless the
//! configuration opts out.

use std::time::Duration;

use thiserror::Error;

use crate::application::provisioners::ProvisionError;
use crate::domain::ConfigValidationError;
use crate::infrastructure::hypervisor::{HypervisorError, ObjectKind};
use crate::infrastructure::remote::ReachabilityError;
use crate::infrastructure::VmBuilderError;

/// The stage a bootstrap error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    Validate,
    Connect,
    IdempotencyCheck,
    ResolveObjects,
    BuildHardware,
    Provision,
    WaitForInstall,
    PostInstall,
    VerifySsh,
}

impl std::fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Validate => "validate",
            Self::Connect => "connect",
            Self::IdempotencyCheck => "idempotency-check",
            Self::ResolveObjects => "resolve-objects",
            Self::BuildHardware => "build-hardware",
            Self::Provision => "provision",
            Self::WaitForInstall => "wait-for-install",
            Self::PostInstall => "post-install",
            Self::VerifySsh => "verify-ssh",
        };
        write!(f, "{label}")
    }
}

/// Errors from the bootstrap workflow
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    #[error("failed to connect to vCenter: {0}")]
    Connect(#[source] HypervisorError),

    #[error("VM '{name}' already exists in datacenter '{datacenter}'")]
    AlreadyExists { name: String, datacenter: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: ObjectKind, name: String },

    #[error("inventory lookup failed: {0}")]
    Lookup(#[source] HypervisorError),

    #[error("failed to build VM hardware: {0}")]
    Build(#[source] VmBuilderError),

    #[error("provisioning failed: {0}")]
    Provision(#[source] ProvisionError),

    #[error("installation did not complete within {} minutes", timeout.as_secs() / 60)]
    InstallTimeout { timeout: Duration },

    #[error("SSH verification failed: {0}")]
    Unreachable(#[source] ReachabilityError),

    #[error("bootstrap cancelled")]
    Cancelled,
}

impl BootstrapError {
    /// Operator-facing hint printed as `Hint: <text>`, when one helps
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfig(_) => {
                Some("Check the configuration file against the documented fields.")
            }
            Self::Connect(_) => {
                Some("Verify the vCenter host, port, credentials, and TLS settings.")
            }
            Self::AlreadyExists { .. } => {
                Some("Use 'recreate' to replace the VM, or 'delete' it first.")
            }
            Self::Unreachable(_) => {
                Some("The guest installed but SSH is not reachable; check the network configuration.")
            }
            _ => None,
        }
    }
}

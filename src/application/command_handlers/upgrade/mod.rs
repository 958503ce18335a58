//! Upgrade command handler (Talos only)
//!
//! An in-place Talos upgrade does not go through vCenter at all: the node
//! replaces its own system image. This handler validates the profile and
//! shells out to the Talos management CLI.

use std::path::PathBuf;

use thiserror::Error;
use tracing::instrument;

use crate::domain::{ConfigValidationError, Profile, VmConfig};
use crate::infrastructure::talosctl::{TalosUpgradeRequest, TalosctlClient, TalosctlError};

/// Operator-supplied upgrade options
#[derive(Debug, Clone, Default)]
pub struct UpgradeOptions {
    /// Upgrade to this version instead of the configured one
    pub version: Option<String>,

    /// Preserve ephemeral data across the upgrade
    pub preserve: bool,

    /// Talk to the node without client certificates
    pub insecure: bool,

    /// Explicit talosconfig path
    pub talosconfig: Option<PathBuf>,

    /// API endpoint override; defaults to the node address
    pub endpoint: Option<String>,
}

/// Errors from the upgrade workflow
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("the 'upgrade' command only applies to the talos profile")]
    NotTalos,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    #[error(transparent)]
    Talosctl(#[from] TalosctlError),
}

/// `UpgradeCommandHandler` performs an in-place Talos upgrade
pub struct UpgradeCommandHandler {
    talosctl: TalosctlClient,
}

impl UpgradeCommandHandler {
    #[must_use]
    pub fn new(talosctl: TalosctlClient) -> Self {
        Self { talosctl }
    }

    /// Upgrade the configured node
    ///
    /// # Errors
    ///
    /// Returns `NotTalos` for non-Talos profiles, or the CLI error.
    #[instrument(
        name = "upgrade_command",
        skip_all,
        fields(command_type = "upgrade", vm = %config.name)
    )]
    pub fn execute(&self, config: &VmConfig, options: &UpgradeOptions) -> Result<(), UpgradeError> {
        let Profile::Talos(talos) = &config.profile else {
            return Err(UpgradeError::NotTalos);
        };

        let node_ip = config.network.parsed_ip()?;
        let version = options
            .version
            .clone()
            .unwrap_or_else(|| talos.version.clone());

        let request = TalosUpgradeRequest {
            node_ip,
            endpoint: options
                .endpoint
                .clone()
                .unwrap_or_else(|| node_ip.to_string()),
            version,
            preserve: options.preserve,
            insecure: options.insecure,
            talosconfig: options.talosconfig.clone(),
        };

        self.talosctl.upgrade(&request)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vm_config::fixtures::ubuntu_config;

    #[test]
    fn it_should_refuse_non_talos_profiles() {
        let handler = UpgradeCommandHandler::new(TalosctlClient::new());

        let result = handler.execute(&ubuntu_config(), &UpgradeOptions::default());

        assert!(matches!(result, Err(UpgradeError::NotTalos)));
    }
}

//! `talosctl` adapter
//!
//! The in-place Talos upgrade is the one lifecycle operation that talks to
//! the node itself rather than to vCenter. It shells out to the Talos
//! management CLI with the installer image for the requested version.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::shared::{CommandError, CommandExecutor};

/// Parameters for an in-place Talos upgrade
#[derive(Debug, Clone)]
pub struct TalosUpgradeRequest {
    /// Node to upgrade
    pub node_ip: Ipv4Addr,

    /// API endpoint, usually the node itself or a control-plane VIP
    pub endpoint: String,

    /// Target Talos version, e.g. `v1.8.1`
    pub version: String,

    /// Preserve ephemeral data across the upgrade
    pub preserve: bool,

    /// Talk to the node without client certificates (maintenance mode)
    pub insecure: bool,

    /// Explicit talosconfig path, when not using the default
    pub talosconfig: Option<PathBuf>,
}

/// Errors from `talosctl` invocations
#[derive(Debug, Error)]
pub enum TalosctlError {
    #[error("talosctl upgrade failed: {0}")]
    Upgrade(#[from] CommandError),
}

/// Wrapper around the `talosctl` CLI
#[derive(Debug, Default)]
pub struct TalosctlClient {
    executor: CommandExecutor,
}

impl TalosctlClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            executor: CommandExecutor::new(),
        }
    }

    /// Run `talosctl upgrade` against one node
    ///
    /// # Errors
    ///
    /// Returns an error when the CLI exits non-zero.
    pub fn upgrade(&self, request: &TalosUpgradeRequest) -> Result<(), TalosctlError> {
        let args = build_upgrade_args(request);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        info!(
            operation = "talos_upgrade",
            node = %request.node_ip,
            version = %request.version,
            preserve = request.preserve,
            "Upgrading Talos node"
        );

        self.executor.run_command("talosctl", &arg_refs, None)?;

        info!(
            operation = "talos_upgrade",
            node = %request.node_ip,
            status = "success",
            "Talos upgrade requested"
        );
        Ok(())
    }
}

fn build_upgrade_args(request: &TalosUpgradeRequest) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        "--nodes".to_string(),
        request.node_ip.to_string(),
        "--endpoints".to_string(),
        request.endpoint.clone(),
        "--image".to_string(),
        format!("ghcr.io/siderolabs/installer:{}", request.version),
    ];
    if request.preserve {
        args.push("--preserve".to_string());
    }
    if request.insecure {
        args.push("--insecure".to_string());
    }
    if let Some(talosconfig) = &request.talosconfig {
        args.push("--talosconfig".to_string());
        args.push(talosconfig.display().to_string());
    }
    args
}

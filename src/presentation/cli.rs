//! Command-line interface definition

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::{LogFormat, LogOutput};

/// Command-line interface for vcenter-vm-bootstrap
#[derive(Parser)]
#[command(name = "vcenter-vm-bootstrap")]
#[command(about = "Provision and bootstrap VMs on a VMware vCenter cluster")]
#[command(version)]
pub struct Cli {
    /// Logging format
    #[arg(long, value_enum, default_value = "compact", global = true)]
    pub log_format: LogFormat,

    /// Log output destination
    #[arg(long, value_enum, default_value = "stderr", global = true)]
    pub log_output: LogOutput,

    /// Directory for log files (created on demand)
    #[arg(long, default_value = "./data/logs", global = true)]
    pub log_dir: PathBuf,

    /// State directory: image cache and install-duration statistics
    #[arg(long, default_value = "./data", global = true)]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision a VM and drive it through installation
    Bootstrap {
        /// VM configuration file (.yaml, .yml, or .json)
        #[arg(short, long)]
        config: PathBuf,

        /// Where to write the bootstrap result (.yaml, .yml, or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Private key path recorded in the bootstrap result
        #[arg(long, default_value = "~/.ssh/id_ed25519")]
        ssh_key_path: String,
    },

    /// Delete a bootstrapped VM
    Delete {
        /// VM configuration file (.yaml, .yml, or .json)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Delete the VM when present, then bootstrap it again
    Recreate {
        /// VM configuration file (.yaml, .yml, or .json)
        #[arg(short, long)]
        config: PathBuf,

        /// Where to write the bootstrap result (.yaml, .yml, or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Private key path recorded in the bootstrap result
        #[arg(long, default_value = "~/.ssh/id_ed25519")]
        ssh_key_path: String,
    },

    /// List datastores, networks, folders, and resource pools
    Resources {
        /// VM configuration file (.yaml, .yml, or .json); only the vCenter
        /// connection and datacenter are used
        #[arg(short, long)]
        config: PathBuf,
    },

    /// In-place Talos upgrade of a bootstrapped node
    Upgrade {
        /// VM configuration file (.yaml, .yml, or .json)
        #[arg(short, long)]
        config: PathBuf,

        /// Upgrade to this Talos version instead of the configured one
        #[arg(long)]
        version: Option<String>,

        /// Preserve ephemeral data across the upgrade
        #[arg(long)]
        preserve: bool,

        /// Talk to the node without client certificates
        #[arg(long)]
        insecure: bool,

        /// Explicit talosconfig path
        #[arg(long)]
        talosconfig: Option<PathBuf>,

        /// API endpoint override; defaults to the node address
        #[arg(long)]
        endpoint: Option<String>,
    },
}

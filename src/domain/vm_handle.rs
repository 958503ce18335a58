//! Handle to a bootstrapped VM
//!
//! Returned by a successful bootstrap run. Carries everything the caller
//! needs to write a `BootstrapResult` and to address the VM later (delete,
//! recreate, upgrade resolve the VM again by name).

use std::net::Ipv4Addr;
use std::time::Duration;

use super::vm_name::VmName;

/// The outcome of a successful bootstrap run
#[derive(Debug, Clone)]
pub struct VmHandle {
    /// VM inventory name
    pub name: VmName,

    /// Static guest IPv4 address from the configuration
    pub ip_address: Ipv4Addr,

    /// Hostname the guest reported when installation completed
    pub hostname: String,

    /// Whether the post-install SSH reachability probe ran and passed
    pub ssh_ready: bool,

    /// How long the installation took, when the watcher measured it
    pub install_duration: Option<Duration>,
}

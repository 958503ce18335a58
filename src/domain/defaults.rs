//! Defaults table for bootstrap runs
//!
//! Values applied to a `VmConfig` before validation, plus the operational
//! timeouts the orchestrator and install watcher run with.

use std::time::Duration;

/// Process-wide defaults for a bootstrap run
#[derive(Debug, Clone)]
pub struct BootstrapDefaults {
    /// vCenter HTTPS port
    pub vcenter_port: u16,

    /// VM firmware when the config does not specify one
    pub firmware: crate::domain::vm_config::Firmware,

    /// Predictable guest NIC name on VMware virtual hardware
    pub guest_nic: String,

    /// Guest timezone
    pub timezone: String,

    /// Guest locale
    pub locale: String,

    /// Swap size in GiB when the config does not specify one
    pub swap_gb: u64,

    /// Install watcher poll interval
    pub install_poll_interval: Duration,

    /// Overall install watcher deadline
    pub install_timeout: Duration,

    /// Consecutive matching hostname polls required to declare install done
    pub required_hostname_checks: u32,

    /// Grace period after install completion for in-guest services to open ports
    pub service_startup_wait: Duration,

    /// SSH reachability probe attempts
    pub ssh_retries: u32,

    /// Delay between SSH reachability attempts
    pub ssh_retry_delay: Duration,

    /// Per-attempt SSH connect timeout
    pub ssh_connect_timeout: Duration,
}

impl BootstrapDefaults {
    /// The standard defaults table
    #[must_use]
    pub fn standard() -> Self {
        Self {
            vcenter_port: 443,
            firmware: crate::domain::vm_config::Firmware::Bios,
            guest_nic: "ens192".to_string(),
            timezone: "UTC".to_string(),
            locale: "en_US.UTF-8".to_string(),
            swap_gb: 0,
            install_poll_interval: Duration::from_secs(10),
            install_timeout: Duration::from_secs(45 * 60),
            required_hostname_checks: 3,
            service_startup_wait: Duration::from_secs(10),
            ssh_retries: 30,
            ssh_retry_delay: Duration::from_secs(10),
            ssh_connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for BootstrapDefaults {
    fn default() -> Self {
        Self::standard()
    }
}

//! Managed object references and guest telemetry types
//!
//! The hypervisor addresses inventory objects by datacenter-scoped names or
//! inventory paths. These references are cheap value types resolved once by
//! the orchestrator and passed to every later operation.

use serde::{Deserialize, Serialize};

/// A resolved datacenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterRef {
    pub name: String,
}

/// A resolved inventory folder (inventory path, e.g. `/DC1/vm/lab`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef {
    pub path: String,
}

/// A resolved resource pool (inventory path)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePoolRef {
    pub path: String,
}

/// A resolved datastore, scoped to its datacenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatastoreRef {
    pub name: String,
    pub datacenter: String,
}

/// A resolved network (port group), scoped to its datacenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef {
    pub name: String,
    pub datacenter: String,
}

/// A VM addressed by name within a datacenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRef {
    pub name: String,
    pub datacenter: String,
    /// Inventory path, e.g. `/DC1/vm/lab/web-01`; used for property fetches
    pub inventory_path: String,
}

/// VM runtime power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
    Unknown,
}

impl PowerState {
    /// Map the vSphere `runtime.powerState` value
    #[must_use]
    pub fn from_vsphere(value: &str) -> Self {
        match value {
            "poweredOn" => Self::PoweredOn,
            "poweredOff" => Self::PoweredOff,
            "suspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }
}

/// VMware Tools running status as reported by the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolsStatus {
    Running,
    NotRunning,
    ExecutingScripts,
    Unknown,
}

impl ToolsStatus {
    /// Map the vSphere `guest.toolsRunningStatus` value
    #[must_use]
    pub fn from_vsphere(value: &str) -> Self {
        match value {
            "guestToolsRunning" => Self::Running,
            "guestToolsNotRunning" => Self::NotRunning,
            "guestToolsExecutingScripts" => Self::ExecutingScripts,
            _ => Self::Unknown,
        }
    }

    /// Whether the guest agent is in its steady running state
    ///
    /// `ExecutingScripts` means boot scripts are still in flight, which the
    /// install watcher must not mistake for a settled guest.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// One guest telemetry snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestInfo {
    pub power_state: PowerState,
    pub tools_status: ToolsStatus,
    /// Hostname the guest reports; `None` until the guest publishes one
    pub hostname: Option<String>,
}

/// Datastore capacity summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreSummary {
    pub name: String,
    pub capacity_bytes: u64,
    pub free_bytes: u64,
    pub accessible: bool,
}

/// Hardware allocation request for a new VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmCreateSpec {
    pub name: String,
    pub cpus: u32,
    pub memory_mb: u64,
    /// vSphere guest identifier, e.g. `ubuntu64Guest`
    pub guest_id: String,
    pub firmware: crate::domain::Firmware,
}

/// An OVA deployment request
#[derive(Debug, Clone)]
pub struct OvaDeployment {
    /// Where to fetch the OVA from
    pub url: url::Url,
    /// Target VM name (rewritten into the import spec)
    pub name: String,
    /// Target network for every OVF network mapping
    pub network_name: String,
    pub datacenter: DatacenterRef,
    pub datastore: DatastoreRef,
    pub folder: Option<FolderRef>,
    pub resource_pool: Option<ResourcePoolRef>,
}

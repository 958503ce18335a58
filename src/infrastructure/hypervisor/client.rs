//! Hypervisor capability surface
//!
//! The orchestrator, VM builder, and ISO manager drive the hypervisor only
//! through this trait. The production implementation is the `govc` CLI
//! adapter in [`super::govc`]; tests substitute an in-memory fake.

use std::path::Path;

use thiserror::Error;

use crate::shared::CommandError;

use super::types::{
    DatacenterRef, DatastoreRef, DatastoreSummary, FolderRef, GuestInfo, NetworkRef, OvaDeployment,
    ResourcePoolRef, VmCreateSpec, VmRef,
};

/// The kind of inventory object a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Datacenter,
    Datastore,
    Network,
    Folder,
    ResourcePool,
    Vm,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Datacenter => "datacenter",
            Self::Datastore => "datastore",
            Self::Network => "network",
            Self::Folder => "folder",
            Self::ResourcePool => "resource pool",
            Self::Vm => "VM",
        };
        write!(f, "{label}")
    }
}

/// Errors from hypervisor operations
#[derive(Debug, Error)]
pub enum HypervisorError {
    #[error("failed to connect to vCenter at '{host}': {source}")]
    ConnectionFailed {
        host: String,
        #[source]
        source: CommandError,
    },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: ObjectKind, name: String },

    #[error("a VM named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("hypervisor command failed: {0}")]
    Command(#[from] CommandError),

    #[error("failed to parse hypervisor output while {context}: {message}")]
    Parse { context: String, message: String },
}

impl HypervisorError {
    /// Whether the error is a missing-object lookup failure
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Opens authenticated hypervisor sessions
///
/// The orchestrator holds a connector rather than a client so each run gets
/// its own short-lived session; tests substitute a fake returning a
/// scripted client.
pub trait HypervisorConnector: Send + Sync {
    /// Open and verify a session for the given connection parameters
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` when the endpoint rejects the session.
    fn connect(
        &self,
        connection: &crate::domain::vm_config::VcenterConnection,
    ) -> Result<std::sync::Arc<dyn HypervisorClient>, HypervisorError>;
}

/// Everything the bootstrap workflow needs from a hypervisor
///
/// Operations are synchronous on the caller; implementations internally
/// await task completion before returning.
pub trait HypervisorClient: Send + Sync {
    /// Verify the session credentials work
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` when the endpoint rejects the session.
    fn connect(&self) -> Result<(), HypervisorError>;

    /// Release the session; never fails, logs on best effort
    fn disconnect(&self);

    // Inventory lookups

    /// # Errors
    /// Returns `NotFound` when the datacenter does not exist.
    fn find_datacenter(&self, name: &str) -> Result<DatacenterRef, HypervisorError>;

    /// Resolve a folder path, defaulting to the datacenter's vm folder
    ///
    /// # Errors
    /// Returns `NotFound` when an explicit path does not exist.
    fn find_folder(
        &self,
        datacenter: &DatacenterRef,
        path: Option<&str>,
    ) -> Result<FolderRef, HypervisorError>;

    /// Resolve a resource pool path, defaulting to the first cluster's root pool
    ///
    /// # Errors
    /// Returns `NotFound` when an explicit path does not exist.
    fn find_resource_pool(
        &self,
        datacenter: &DatacenterRef,
        path: Option<&str>,
    ) -> Result<ResourcePoolRef, HypervisorError>;

    /// # Errors
    /// Returns `NotFound` when the datastore does not exist.
    fn find_datastore(
        &self,
        datacenter: &DatacenterRef,
        name: &str,
    ) -> Result<DatastoreRef, HypervisorError>;

    /// # Errors
    /// Returns `NotFound` when the network does not exist.
    fn find_network(
        &self,
        datacenter: &DatacenterRef,
        name: &str,
    ) -> Result<NetworkRef, HypervisorError>;

    /// Look up a VM by name; an absent VM is `Ok(None)`, not an error
    ///
    /// # Errors
    /// Returns an error only for command or session failures.
    fn find_vm(
        &self,
        datacenter: &DatacenterRef,
        name: &str,
    ) -> Result<Option<VmRef>, HypervisorError>;

    // Inventory listings

    /// # Errors
    /// Returns an error when the listing command fails or its output is unparsable.
    fn list_datastores(
        &self,
        datacenter: &DatacenterRef,
    ) -> Result<Vec<DatastoreSummary>, HypervisorError>;

    /// # Errors
    /// Returns an error when the listing command fails.
    fn list_networks(&self, datacenter: &DatacenterRef) -> Result<Vec<String>, HypervisorError>;

    /// # Errors
    /// Returns an error when the listing command fails.
    fn list_folders(&self, datacenter: &DatacenterRef) -> Result<Vec<String>, HypervisorError>;

    /// # Errors
    /// Returns an error when the listing command fails.
    fn list_resource_pools(
        &self,
        datacenter: &DatacenterRef,
    ) -> Result<Vec<String>, HypervisorError>;

    // Guest telemetry

    /// One snapshot of power state, Tools status, and guest hostname
    ///
    /// # Errors
    /// Returns an error when the property fetch fails; callers treat this as
    /// "no new information", not as install failure.
    fn fetch_guest_info(&self, vm: &VmRef) -> Result<GuestInfo, HypervisorError>;

    // Hardware allocation

    /// Create the bare VM (no disks, no NIC), powered off
    ///
    /// # Errors
    /// Returns `DuplicateName` when the hypervisor reports a unique-name
    /// violation; any other failure as `Command`.
    fn create_vm(
        &self,
        datacenter: &DatacenterRef,
        folder: &FolderRef,
        resource_pool: &ResourcePoolRef,
        datastore: &DatastoreRef,
        spec: &VmCreateSpec,
    ) -> Result<VmRef, HypervisorError>;

    /// The SCSI controller device name, when one exists
    ///
    /// # Errors
    /// Returns an error when the device listing fails.
    fn find_scsi_controller(&self, vm: &VmRef) -> Result<Option<String>, HypervisorError>;

    /// Attach a disk of `size_gb` as disk number `disk_index` on the VM's
    /// SCSI controller
    ///
    /// # Errors
    /// Returns an error when the disk task fails.
    fn add_disk(
        &self,
        vm: &VmRef,
        datastore: &DatastoreRef,
        size_gb: u64,
        disk_index: u32,
    ) -> Result<(), HypervisorError>;

    /// # Errors
    /// Returns an error when the NIC task fails.
    fn add_network_adapter(&self, vm: &VmRef, network: &NetworkRef)
        -> Result<(), HypervisorError>;

    // Power and destroy

    /// # Errors
    /// Returns an error when the power task fails.
    fn power_on(&self, vm: &VmRef) -> Result<(), HypervisorError>;

    /// # Errors
    /// Returns an error when the power task fails.
    fn power_off(&self, vm: &VmRef) -> Result<(), HypervisorError>;

    /// # Errors
    /// Returns an error when the destroy task fails. Destroying an absent VM
    /// is an error at this layer; the VM builder adds the tolerant semantics.
    fn destroy(&self, vm: &VmRef) -> Result<(), HypervisorError>;

    // Datastore files

    /// Upload with overwrite semantics
    ///
    /// # Errors
    /// Returns an error when the upload fails.
    fn upload_to_datastore(
        &self,
        datastore: &DatastoreRef,
        local: &Path,
        remote: &str,
    ) -> Result<(), HypervisorError>;

    /// # Errors
    /// Returns an error when the deletion fails.
    fn delete_from_datastore(
        &self,
        datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), HypervisorError>;

    /// Whether a file exists at the datastore path
    ///
    /// # Errors
    /// Returns an error when the listing command itself cannot run; a missing
    /// file is `Ok(false)`.
    fn datastore_file_exists(
        &self,
        datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<bool, HypervisorError>;

    // Virtual CD-ROMs

    /// Add a CD-ROM device and return its device name
    ///
    /// # Errors
    /// Returns an error when the device task fails.
    fn add_cdrom(&self, vm: &VmRef) -> Result<String, HypervisorError>;

    /// # Errors
    /// Returns an error when the media insert fails.
    fn insert_cdrom_media(
        &self,
        vm: &VmRef,
        device: &str,
        datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), HypervisorError>;

    /// Mark a device connected (and connect-at-power-on)
    ///
    /// # Errors
    /// Returns an error when the device task fails.
    fn connect_device(&self, vm: &VmRef, device: &str) -> Result<(), HypervisorError>;

    /// # Errors
    /// Returns an error when the device listing fails.
    fn list_cdroms(&self, vm: &VmRef) -> Result<Vec<String>, HypervisorError>;

    /// # Errors
    /// Returns an error when the device removal fails.
    fn remove_device(&self, vm: &VmRef, device: &str) -> Result<(), HypervisorError>;

    // OVA import

    /// Fetch the OVF import spec for an OVA URL (JSON document)
    ///
    /// # Errors
    /// Returns an error when the spec fetch fails.
    fn fetch_ova_import_spec(&self, url: &url::Url) -> Result<String, HypervisorError>;

    /// Import an OVA with a prepared options file; the VM is left powered off
    ///
    /// # Errors
    /// Returns `DuplicateName` on a unique-name violation, `Command` otherwise.
    fn import_ova(
        &self,
        deployment: &OvaDeployment,
        options_file: &Path,
    ) -> Result<VmRef, HypervisorError>;
}

//! VM hardware allocation
//!
//! `VmBuilder` turns a validated configuration into vCenter hardware: the
//! bare VM, its SCSI controller, one or two disks, and the NIC. It also owns
//! power transitions and the tolerant delete the cleanup path relies on.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::domain::{Profile, VmConfig};

use super::hypervisor::{
    DatacenterRef, DatastoreRef, FolderRef, HypervisorClient, HypervisorError, NetworkRef,
    ResourcePoolRef, VmCreateSpec, VmRef,
};

/// Errors from hardware allocation
#[derive(Debug, Error)]
pub enum VmBuilderError {
    #[error("a VM named '{name}' already exists")]
    DuplicateName { name: String },

    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),
}

/// Allocates VM hardware through the hypervisor capability surface
pub struct VmBuilder {
    client: Arc<dyn HypervisorClient>,
}

impl VmBuilder {
    #[must_use]
    pub fn new(client: Arc<dyn HypervisorClient>) -> Self {
        Self { client }
    }

    /// Build the hardware allocation request from the configuration
    #[must_use]
    pub fn create_spec(config: &VmConfig) -> VmCreateSpec {
        let guest_id = match &config.profile {
            Profile::Ubuntu(_) => "ubuntu64Guest",
            Profile::Talos(_) => "otherLinux64Guest",
        };

        VmCreateSpec {
            name: config.name.clone(),
            cpus: config.hardware.cpus,
            memory_mb: config.hardware.memory_mb,
            guest_id: guest_id.to_string(),
            firmware: config
                .hardware
                .firmware
                .unwrap_or(crate::domain::Firmware::Bios),
        }
    }

    /// Create the bare VM, powered off
    ///
    /// # Errors
    ///
    /// Returns `DuplicateName` when a VM of the same name already exists in
    /// the folder; the orchestrator also filters this beforehand, but two
    /// concurrent runs can both pass that check and race here.
    pub fn create(
        &self,
        datacenter: &DatacenterRef,
        folder: &FolderRef,
        resource_pool: &ResourcePoolRef,
        datastore: &DatastoreRef,
        spec: &VmCreateSpec,
    ) -> Result<VmRef, VmBuilderError> {
        info!(
            operation = "vm_create",
            vm = %spec.name,
            cpus = spec.cpus,
            memory_mb = spec.memory_mb,
            firmware = %spec.firmware,
            "Creating VM"
        );

        self.client
            .create_vm(datacenter, folder, resource_pool, datastore, spec)
            .map_err(|error| match error {
                HypervisorError::DuplicateName { name } => VmBuilderError::DuplicateName { name },
                other => VmBuilderError::Hypervisor(other),
            })
    }

    /// The SCSI controller key disks attach to
    ///
    /// vSphere creates the paravirtual controller together with the first
    /// disk; when none exists yet this returns the key the controller will
    /// receive.
    ///
    /// # Errors
    ///
    /// Returns an error when the device listing fails.
    pub fn ensure_scsi_controller(&self, vm: &VmRef) -> Result<String, VmBuilderError> {
        match self.client.find_scsi_controller(vm)? {
            Some(controller) => Ok(controller),
            None => Ok("pvscsi-1000".to_string()),
        }
    }

    /// Attach a disk with the next sequential unit number
    ///
    /// `disk_index` 0 is the OS disk, 1 the data disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the disk task fails.
    pub fn add_disk(
        &self,
        vm: &VmRef,
        datastore: &DatastoreRef,
        size_gb: u64,
        disk_index: u32,
    ) -> Result<(), VmBuilderError> {
        info!(
            operation = "vm_add_disk",
            vm = %vm.name,
            size_gb,
            disk_index,
            "Attaching disk"
        );
        self.client.add_disk(vm, datastore, size_gb, disk_index)?;
        Ok(())
    }

    /// Attach the NIC on the configured network
    ///
    /// # Errors
    ///
    /// Returns an error when the NIC task fails.
    pub fn add_network_adapter(
        &self,
        vm: &VmRef,
        network: &NetworkRef,
    ) -> Result<(), VmBuilderError> {
        info!(
            operation = "vm_add_nic",
            vm = %vm.name,
            network = %network.name,
            "Attaching network adapter"
        );
        self.client.add_network_adapter(vm, network)?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when the power task fails.
    pub fn power_on(&self, vm: &VmRef) -> Result<(), VmBuilderError> {
        info!(operation = "vm_power", vm = %vm.name, state = "on", "Powering VM on");
        self.client.power_on(vm)?;
        Ok(())
    }

    /// # Errors
    /// Returns an error when the power task fails.
    pub fn power_off(&self, vm: &VmRef) -> Result<(), VmBuilderError> {
        info!(operation = "vm_power", vm = %vm.name, state = "off", "Powering VM off");
        self.client.power_off(vm)?;
        Ok(())
    }

    /// Destroy the VM; an absent VM is a successful no-op
    ///
    /// # Errors
    ///
    /// Returns an error when the destroy task fails for any reason other
    /// than the VM not existing.
    pub fn delete(&self, vm: &VmRef) -> Result<(), VmBuilderError> {
        info!(operation = "vm_delete", vm = %vm.name, "Destroying VM");
        match self.client.destroy(vm) {
            Ok(()) => Ok(()),
            Err(error) if error.is_not_found() => {
                info!(
                    operation = "vm_delete",
                    vm = %vm.name,
                    "VM already absent, nothing to destroy"
                );
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

//! In-memory fake of the hypervisor capability surface
//!
//! Used by unit tests across the crate: the VM builder, the install watcher,
//! and the bootstrap scenario tests all observe and script hypervisor
//! behavior through this fake. Every operation appends to a call log so
//! tests can assert exact call counts (e.g. destroy exactly once).

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use parking_lot::Mutex;
use url::Url;

use crate::shared::CommandError;

use super::client::{HypervisorClient, HypervisorError, ObjectKind};
use super::types::{
    DatacenterRef, DatastoreRef, DatastoreSummary, FolderRef, GuestInfo, NetworkRef, OvaDeployment,
    PowerState, ResourcePoolRef, ToolsStatus, VmCreateSpec, VmRef,
};

/// Scriptable, call-recording hypervisor fake
#[derive(Default)]
pub struct FakeHypervisorClient {
    calls: Mutex<Vec<String>>,
    existing_vms: Mutex<HashSet<String>>,
    missing_objects: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, String>>,
    guest_feed: Mutex<VecDeque<Result<GuestInfo, ()>>>,
    last_guest: Mutex<Option<GuestInfo>>,
    scsi_controller: Mutex<Option<String>>,
    mounted_cdroms: Mutex<Vec<String>>,
    cdrom_counter: Mutex<u32>,
    destroy_reports_absent: Mutex<bool>,
    import_spec: Mutex<String>,
    uploaded_files: Mutex<HashSet<String>>,
}

impl FakeHypervisorClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            import_spec: Mutex::new(
                r#"{"Name":"imported","NetworkMapping":[{"Name":"VM Network","Network":"VM Network"}]}"#
                    .to_string(),
            ),
            ..Self::default()
        }
    }

    // Scripting knobs

    pub fn add_existing_vm(&self, name: &str) {
        self.existing_vms.lock().insert(name.to_string());
    }

    pub fn set_missing_object(&self, name: &str) {
        self.missing_objects.lock().insert(name.to_string());
    }

    /// Make the named operation fail with the given stderr message
    pub fn fail_op(&self, op: &str, message: &str) {
        self.failures
            .lock()
            .insert(op.to_string(), message.to_string());
    }

    pub fn set_destroy_reports_absent(&self, absent: bool) {
        *self.destroy_reports_absent.lock() = absent;
    }

    pub fn set_scsi_controller(&self, controller: Option<String>) {
        *self.scsi_controller.lock() = controller;
    }

    pub fn set_import_spec(&self, spec: &str) {
        *self.import_spec.lock() = spec.to_string();
    }

    /// Queue one telemetry snapshot for `fetch_guest_info`
    pub fn push_guest_info(&self, tools_running: bool, hostname: &str) {
        let info = GuestInfo {
            power_state: PowerState::PoweredOn,
            tools_status: if tools_running {
                ToolsStatus::Running
            } else {
                ToolsStatus::NotRunning
            },
            hostname: if hostname.is_empty() {
                None
            } else {
                Some(hostname.to_string())
            },
        };
        self.guest_feed.lock().push_back(Ok(info));
    }

    /// Queue one failing property fetch
    pub fn push_guest_fetch_error(&self) {
        self.guest_feed.lock().push_back(Err(()));
    }

    // Observation

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    // Internals

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn fail_if_scripted(&self, op: &str) -> Result<(), HypervisorError> {
        if let Some(message) = self.failures.lock().get(op) {
            return Err(HypervisorError::Command(CommandError::ExecutionFailed {
                command: op.to_string(),
                exit_code: "1".to_string(),
                stdout: String::new(),
                stderr: message.clone(),
            }));
        }
        Ok(())
    }

    fn check_missing(&self, kind: ObjectKind, name: &str) -> Result<(), HypervisorError> {
        if self.missing_objects.lock().contains(name) {
            return Err(HypervisorError::NotFound {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn vm_ref(name: &str, datacenter: &str) -> VmRef {
        VmRef {
            name: name.to_string(),
            datacenter: datacenter.to_string(),
            inventory_path: format!("/{datacenter}/vm/{name}"),
        }
    }
}

impl HypervisorClient for FakeHypervisorClient {
    fn connect(&self) -> Result<(), HypervisorError> {
        self.record("connect".to_string());
        if self.failures.lock().contains_key("connect") {
            return Err(HypervisorError::ConnectionFailed {
                host: "vcenter.local".to_string(),
                source: CommandError::ExecutionFailed {
                    command: "connect".to_string(),
                    exit_code: "1".to_string(),
                    stdout: String::new(),
                    stderr: "invalid login".to_string(),
                },
            });
        }
        Ok(())
    }

    fn disconnect(&self) {
        self.record("disconnect".to_string());
    }

    fn find_datacenter(&self, name: &str) -> Result<DatacenterRef, HypervisorError> {
        self.record(format!("find_datacenter:{name}"));
        self.check_missing(ObjectKind::Datacenter, name)?;
        Ok(DatacenterRef {
            name: name.to_string(),
        })
    }

    fn find_folder(
        &self,
        datacenter: &DatacenterRef,
        path: Option<&str>,
    ) -> Result<FolderRef, HypervisorError> {
        self.record(format!("find_folder:{}", path.unwrap_or("<default>")));
        if let Some(path) = path {
            self.check_missing(ObjectKind::Folder, path)?;
        }
        Ok(FolderRef {
            path: path.map_or_else(
                || format!("/{}/vm", datacenter.name),
                ToString::to_string,
            ),
        })
    }

    fn find_resource_pool(
        &self,
        datacenter: &DatacenterRef,
        path: Option<&str>,
    ) -> Result<ResourcePoolRef, HypervisorError> {
        self.record(format!("find_resource_pool:{}", path.unwrap_or("<default>")));
        if let Some(path) = path {
            self.check_missing(ObjectKind::ResourcePool, path)?;
        }
        Ok(ResourcePoolRef {
            path: path.map_or_else(
                || format!("/{}/host/cluster/Resources", datacenter.name),
                ToString::to_string,
            ),
        })
    }

    fn find_datastore(
        &self,
        datacenter: &DatacenterRef,
        name: &str,
    ) -> Result<DatastoreRef, HypervisorError> {
        self.record(format!("find_datastore:{name}"));
        self.check_missing(ObjectKind::Datastore, name)?;
        Ok(DatastoreRef {
            name: name.to_string(),
            datacenter: datacenter.name.clone(),
        })
    }

    fn find_network(
        &self,
        datacenter: &DatacenterRef,
        name: &str,
    ) -> Result<NetworkRef, HypervisorError> {
        self.record(format!("find_network:{name}"));
        self.check_missing(ObjectKind::Network, name)?;
        Ok(NetworkRef {
            name: name.to_string(),
            datacenter: datacenter.name.clone(),
        })
    }

    fn find_vm(
        &self,
        datacenter: &DatacenterRef,
        name: &str,
    ) -> Result<Option<VmRef>, HypervisorError> {
        self.record(format!("find_vm:{name}"));
        if self.existing_vms.lock().contains(name) {
            return Ok(Some(Self::vm_ref(name, &datacenter.name)));
        }
        Ok(None)
    }

    fn list_datastores(
        &self,
        _datacenter: &DatacenterRef,
    ) -> Result<Vec<DatastoreSummary>, HypervisorError> {
        self.record("list_datastores".to_string());
        Ok(vec![])
    }

    fn list_networks(&self, _datacenter: &DatacenterRef) -> Result<Vec<String>, HypervisorError> {
        self.record("list_networks".to_string());
        Ok(vec![])
    }

    fn list_folders(&self, _datacenter: &DatacenterRef) -> Result<Vec<String>, HypervisorError> {
        self.record("list_folders".to_string());
        Ok(vec![])
    }

    fn list_resource_pools(
        &self,
        _datacenter: &DatacenterRef,
    ) -> Result<Vec<String>, HypervisorError> {
        self.record("list_resource_pools".to_string());
        Ok(vec![])
    }

    fn fetch_guest_info(&self, vm: &VmRef) -> Result<GuestInfo, HypervisorError> {
        self.record(format!("fetch_guest_info:{}", vm.name));
        let next = self.guest_feed.lock().pop_front();
        match next {
            Some(Ok(info)) => {
                *self.last_guest.lock() = Some(info.clone());
                Ok(info)
            }
            Some(Err(())) => Err(HypervisorError::Command(CommandError::ExecutionFailed {
                command: "object.collect".to_string(),
                exit_code: "1".to_string(),
                stdout: String::new(),
                stderr: "transient".to_string(),
            })),
            None => Ok(self.last_guest.lock().clone().unwrap_or(GuestInfo {
                power_state: PowerState::PoweredOff,
                tools_status: ToolsStatus::NotRunning,
                hostname: None,
            })),
        }
    }

    fn create_vm(
        &self,
        datacenter: &DatacenterRef,
        _folder: &FolderRef,
        _resource_pool: &ResourcePoolRef,
        _datastore: &DatastoreRef,
        spec: &VmCreateSpec,
    ) -> Result<VmRef, HypervisorError> {
        self.record(format!("create_vm:{}", spec.name));
        self.fail_if_scripted("create_vm")?;
        if !self.existing_vms.lock().insert(spec.name.clone()) {
            return Err(HypervisorError::DuplicateName {
                name: spec.name.clone(),
            });
        }
        Ok(Self::vm_ref(&spec.name, &datacenter.name))
    }

    fn find_scsi_controller(&self, vm: &VmRef) -> Result<Option<String>, HypervisorError> {
        self.record(format!("find_scsi_controller:{}", vm.name));
        Ok(self.scsi_controller.lock().clone())
    }

    fn add_disk(
        &self,
        vm: &VmRef,
        _datastore: &DatastoreRef,
        size_gb: u64,
        disk_index: u32,
    ) -> Result<(), HypervisorError> {
        self.record(format!("add_disk:{}:{size_gb}:{disk_index}", vm.name));
        self.fail_if_scripted("add_disk")
    }

    fn add_network_adapter(
        &self,
        vm: &VmRef,
        network: &NetworkRef,
    ) -> Result<(), HypervisorError> {
        self.record(format!("add_network_adapter:{}:{}", vm.name, network.name));
        self.fail_if_scripted("add_network_adapter")
    }

    fn power_on(&self, vm: &VmRef) -> Result<(), HypervisorError> {
        self.record(format!("power_on:{}", vm.name));
        self.fail_if_scripted("power_on")
    }

    fn power_off(&self, vm: &VmRef) -> Result<(), HypervisorError> {
        self.record(format!("power_off:{}", vm.name));
        self.fail_if_scripted("power_off")
    }

    fn destroy(&self, vm: &VmRef) -> Result<(), HypervisorError> {
        self.record(format!("destroy:{}", vm.name));
        if *self.destroy_reports_absent.lock() {
            return Err(HypervisorError::NotFound {
                kind: ObjectKind::Vm,
                name: vm.name.clone(),
            });
        }
        self.existing_vms.lock().remove(&vm.name);
        Ok(())
    }

    fn upload_to_datastore(
        &self,
        _datastore: &DatastoreRef,
        _local: &Path,
        remote: &str,
    ) -> Result<(), HypervisorError> {
        self.record(format!("upload:{remote}"));
        self.fail_if_scripted("upload")?;
        self.uploaded_files.lock().insert(remote.to_string());
        Ok(())
    }

    fn datastore_file_exists(
        &self,
        _datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<bool, HypervisorError> {
        self.record(format!("datastore_file_exists:{remote}"));
        Ok(self.uploaded_files.lock().contains(remote))
    }

    fn delete_from_datastore(
        &self,
        _datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), HypervisorError> {
        self.record(format!("delete_from_datastore:{remote}"));
        self.fail_if_scripted("delete_from_datastore")
    }

    fn add_cdrom(&self, vm: &VmRef) -> Result<String, HypervisorError> {
        let mut counter = self.cdrom_counter.lock();
        let device = format!("cdrom-{}", 3000 + *counter);
        *counter += 1;
        drop(counter);

        self.record(format!("add_cdrom:{}:{device}", vm.name));
        self.mounted_cdroms.lock().push(device.clone());
        Ok(device)
    }

    fn insert_cdrom_media(
        &self,
        vm: &VmRef,
        device: &str,
        _datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), HypervisorError> {
        self.record(format!("insert_cdrom_media:{}:{device}:{remote}", vm.name));
        self.fail_if_scripted("insert_cdrom_media")
    }

    fn connect_device(&self, vm: &VmRef, device: &str) -> Result<(), HypervisorError> {
        self.record(format!("connect_device:{}:{device}", vm.name));
        Ok(())
    }

    fn list_cdroms(&self, vm: &VmRef) -> Result<Vec<String>, HypervisorError> {
        self.record(format!("list_cdroms:{}", vm.name));
        Ok(self.mounted_cdroms.lock().clone())
    }

    fn remove_device(&self, vm: &VmRef, device: &str) -> Result<(), HypervisorError> {
        self.record(format!("remove_device:{}:{device}", vm.name));
        self.mounted_cdroms.lock().retain(|d| d != device);
        Ok(())
    }

    fn fetch_ova_import_spec(&self, url: &Url) -> Result<String, HypervisorError> {
        self.record(format!("fetch_ova_import_spec:{url}"));
        self.fail_if_scripted("fetch_ova_import_spec")?;
        Ok(self.import_spec.lock().clone())
    }

    fn import_ova(
        &self,
        deployment: &OvaDeployment,
        _options_file: &Path,
    ) -> Result<VmRef, HypervisorError> {
        self.record(format!("import_ova:{}", deployment.name));
        self.fail_if_scripted("import_ova")?;
        self.existing_vms.lock().insert(deployment.name.clone());
        Ok(Self::vm_ref(
            &deployment.name,
            &deployment.datacenter.name,
        ))
    }
}

//! `govc` CLI adapter for the hypervisor capability surface
//!
//! Production implementation of [`HypervisorClient`] on top of the `govc`
//! vSphere CLI. Credentials travel as `GOVC_*` environment variables and are
//! redacted from log output by the command executor. Every operation maps a
//! single `govc` invocation; task completion is awaited by `govc` itself
//! before it exits.

use std::path::Path;

use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::domain::vm_config::VcenterConnection;
use crate::shared::{CommandError, CommandExecutor, CommandResult, EnvVar};

use super::client::{HypervisorClient, HypervisorError, ObjectKind};
use super::types::{
    DatacenterRef, DatastoreRef, DatastoreSummary, FolderRef, GuestInfo, NetworkRef, OvaDeployment,
    PowerState, ResourcePoolRef, ToolsStatus, VmCreateSpec, VmRef,
};

/// Production connector building `govc`-backed clients
#[derive(Debug, Default)]
pub struct GovcConnector {}

impl GovcConnector {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }
}

impl super::client::HypervisorConnector for GovcConnector {
    fn connect(
        &self,
        connection: &VcenterConnection,
    ) -> Result<std::sync::Arc<dyn HypervisorClient>, HypervisorError> {
        let client = std::sync::Arc::new(GovcClient::new(connection.clone()));
        client.connect()?;
        Ok(client)
    }
}

/// Hypervisor client backed by the `govc` CLI
pub struct GovcClient {
    executor: CommandExecutor,
    connection: VcenterConnection,
}

impl GovcClient {
    #[must_use]
    pub fn new(connection: VcenterConnection) -> Self {
        Self {
            executor: CommandExecutor::new(),
            connection,
        }
    }

    fn env(&self) -> Vec<EnvVar> {
        let url = format!(
            "https://{}:{}/sdk",
            self.connection.host, self.connection.port
        );
        vec![
            EnvVar::plain("GOVC_URL", url),
            EnvVar::plain("GOVC_USERNAME", self.connection.username.clone()),
            EnvVar::secret("GOVC_PASSWORD", self.connection.password.expose_secret()),
            EnvVar::plain(
                "GOVC_INSECURE",
                if self.connection.insecure {
                    "true"
                } else {
                    "false"
                },
            ),
        ]
    }

    fn govc(&self, args: &[&str]) -> Result<CommandResult, CommandError> {
        self.executor
            .run_command_with_env("govc", args, &self.env(), None)
    }

    /// Fetch a single scalar property of a managed object
    fn collect_property(&self, inventory_path: &str, property: &str) -> Result<String, HypervisorError> {
        let result = self.govc(&["object.collect", "-s", inventory_path, property])?;
        Ok(result.stdout_trimmed().to_string())
    }

    fn vm_folder_root(datacenter: &DatacenterRef) -> String {
        format!("/{}/vm", datacenter.name)
    }
}

/// Rewrite a lookup failure into `NotFound` when the CLI says so
fn map_not_found(
    error: CommandError,
    kind: ObjectKind,
    name: &str,
) -> HypervisorError {
    let looks_absent = error
        .stderr()
        .map_or(false, |stderr| stderr.contains("not found"));
    if looks_absent {
        HypervisorError::NotFound {
            kind,
            name: name.to_string(),
        }
    } else {
        HypervisorError::Command(error)
    }
}

/// Rewrite a creation failure into `DuplicateName` when the CLI says so
fn map_duplicate_name(error: CommandError, name: &str) -> HypervisorError {
    let duplicate = error.stderr().map_or(false, |stderr| {
        stderr.contains("already exists") || stderr.contains("DuplicateName")
    });
    if duplicate {
        HypervisorError::DuplicateName {
            name: name.to_string(),
        }
    } else {
        HypervisorError::Command(error)
    }
}

/// First SCSI controller device name in a `device.ls` listing, if any
fn first_scsi_controller(device_listing: &str) -> Option<String> {
    device_listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|device| {
            device.starts_with("pvscsi-")
                || device.starts_with("lsilogic-")
                || device.starts_with("scsi-")
        })
        .map(ToString::to_string)
}

/// CD-ROM device names in a `device.ls` listing
fn cdrom_devices(device_listing: &str) -> Vec<String> {
    device_listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|device| device.starts_with("cdrom-"))
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Deserialize)]
struct DatastoreInfoDoc {
    #[serde(alias = "Datastores", default)]
    datastores: Vec<DatastoreDoc>,
}

#[derive(Debug, Deserialize)]
struct DatastoreDoc {
    #[serde(alias = "Name", default)]
    name: String,
    #[serde(alias = "Summary", default)]
    summary: DatastoreSummaryDoc,
}

#[derive(Debug, Default, Deserialize)]
struct DatastoreSummaryDoc {
    #[serde(alias = "Capacity", default)]
    capacity: u64,
    #[serde(alias = "FreeSpace", alias = "freeSpace", default)]
    free_space: u64,
    #[serde(alias = "Accessible", default)]
    accessible: bool,
    #[serde(alias = "Name", default)]
    name: String,
}

/// Parse `datastore.info -json` output into capacity summaries
fn parse_datastore_summaries(json: &str) -> Result<Vec<DatastoreSummary>, HypervisorError> {
    let doc: DatastoreInfoDoc =
        serde_json::from_str(json).map_err(|e| HypervisorError::Parse {
            context: "listing datastores".to_string(),
            message: e.to_string(),
        })?;

    Ok(doc
        .datastores
        .into_iter()
        .map(|datastore| {
            let name = if datastore.name.is_empty() {
                datastore.summary.name.clone()
            } else {
                datastore.name
            };
            DatastoreSummary {
                name,
                capacity_bytes: datastore.summary.capacity,
                free_bytes: datastore.summary.free_space,
                accessible: datastore.summary.accessible,
            }
        })
        .collect())
}

/// Last path component of an inventory path
fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl HypervisorClient for GovcClient {
    fn connect(&self) -> Result<(), HypervisorError> {
        info!(
            operation = "hypervisor_connect",
            host = %self.connection.host,
            port = self.connection.port,
            "Opening vCenter session"
        );
        self.govc(&["about"])
            .map_err(|source| HypervisorError::ConnectionFailed {
                host: self.connection.host.clone(),
                source,
            })?;
        Ok(())
    }

    fn disconnect(&self) {
        // Sessions are per-invocation; there is no long-lived handle to tear
        // down. Logged for symmetry with connect.
        debug!(
            operation = "hypervisor_disconnect",
            host = %self.connection.host,
            "Releasing vCenter session"
        );
    }

    fn find_datacenter(&self, name: &str) -> Result<DatacenterRef, HypervisorError> {
        self.govc(&["datacenter.info", name])
            .map_err(|e| map_not_found(e, ObjectKind::Datacenter, name))?;
        Ok(DatacenterRef {
            name: name.to_string(),
        })
    }

    fn find_folder(
        &self,
        datacenter: &DatacenterRef,
        path: Option<&str>,
    ) -> Result<FolderRef, HypervisorError> {
        match path.filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                self.govc(&["folder.info", "-dc", &datacenter.name, path])
                    .map_err(|e| map_not_found(e, ObjectKind::Folder, path))?;
                let absolute = if path.starts_with('/') {
                    path.to_string()
                } else {
                    format!("{}/{}", Self::vm_folder_root(datacenter), path)
                };
                Ok(FolderRef { path: absolute })
            }
            None => Ok(FolderRef {
                path: Self::vm_folder_root(datacenter),
            }),
        }
    }

    fn find_resource_pool(
        &self,
        datacenter: &DatacenterRef,
        path: Option<&str>,
    ) -> Result<ResourcePoolRef, HypervisorError> {
        match path.filter(|p| !p.trim().is_empty()) {
            Some(path) => {
                self.govc(&["pool.info", "-dc", &datacenter.name, path])
                    .map_err(|e| map_not_found(e, ObjectKind::ResourcePool, path))?;
                Ok(ResourcePoolRef {
                    path: path.to_string(),
                })
            }
            None => {
                let root = format!("/{}/host", datacenter.name);
                let result = self.govc(&["find", "-type", "p", &root])?;
                result
                    .stdout_lines()
                    .first()
                    .map(|path| ResourcePoolRef {
                        path: (*path).to_string(),
                    })
                    .ok_or_else(|| HypervisorError::NotFound {
                        kind: ObjectKind::ResourcePool,
                        name: "Resources".to_string(),
                    })
            }
        }
    }

    fn find_datastore(
        &self,
        datacenter: &DatacenterRef,
        name: &str,
    ) -> Result<DatastoreRef, HypervisorError> {
        self.govc(&["datastore.info", "-dc", &datacenter.name, name])
            .map_err(|e| map_not_found(e, ObjectKind::Datastore, name))?;
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
        let root = format!("/{}/network", datacenter.name);
        let result = self.govc(&["find", "-type", "n", "-name", name, &root])?;
        if result.stdout_trimmed().is_empty() {
            return Err(HypervisorError::NotFound {
                kind: ObjectKind::Network,
                name: name.to_string(),
            });
        }
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
        let root = Self::vm_folder_root(datacenter);
        let result = self.govc(&["find", "-type", "m", "-name", name, &root])?;
        let path = result.stdout_lines().first().copied();

        Ok(path.map(|path| VmRef {
            name: name.to_string(),
            datacenter: datacenter.name.clone(),
            inventory_path: path.to_string(),
        }))
    }

    fn list_datastores(
        &self,
        datacenter: &DatacenterRef,
    ) -> Result<Vec<DatastoreSummary>, HypervisorError> {
        let result = self.govc(&["datastore.info", "-dc", &datacenter.name, "-json"])?;
        parse_datastore_summaries(&result.stdout)
    }

    fn list_networks(&self, datacenter: &DatacenterRef) -> Result<Vec<String>, HypervisorError> {
        let root = format!("/{}/network", datacenter.name);
        let result = self.govc(&["find", "-type", "n", &root])?;
        Ok(result
            .stdout_lines()
            .into_iter()
            .map(|line| basename(line).to_string())
            .collect())
    }

    fn list_folders(&self, datacenter: &DatacenterRef) -> Result<Vec<String>, HypervisorError> {
        let root = Self::vm_folder_root(datacenter);
        let result = self.govc(&["find", "-type", "f", &root])?;
        Ok(result
            .stdout_lines()
            .into_iter()
            .map(ToString::to_string)
            .collect())
    }

    fn list_resource_pools(
        &self,
        datacenter: &DatacenterRef,
    ) -> Result<Vec<String>, HypervisorError> {
        let root = format!("/{}/host", datacenter.name);
        let result = self.govc(&["find", "-type", "p", &root])?;
        Ok(result
            .stdout_lines()
            .into_iter()
            .map(ToString::to_string)
            .collect())
    }

    fn fetch_guest_info(&self, vm: &VmRef) -> Result<GuestInfo, HypervisorError> {
        let power = self.collect_property(&vm.inventory_path, "runtime.powerState")?;
        let tools = self.collect_property(&vm.inventory_path, "guest.toolsRunningStatus")?;
        let hostname = self.collect_property(&vm.inventory_path, "guest.hostName")?;

        Ok(GuestInfo {
            power_state: PowerState::from_vsphere(&power),
            tools_status: ToolsStatus::from_vsphere(&tools),
            hostname: if hostname.is_empty() {
                None
            } else {
                Some(hostname)
            },
        })
    }

    fn create_vm(
        &self,
        datacenter: &DatacenterRef,
        folder: &FolderRef,
        resource_pool: &ResourcePoolRef,
        datastore: &DatastoreRef,
        spec: &VmCreateSpec,
    ) -> Result<VmRef, HypervisorError> {
        let cpus = spec.cpus.to_string();
        let memory = spec.memory_mb.to_string();
        let firmware = spec.firmware.to_string();

        self.govc(&[
            "vm.create",
            "-dc",
            &datacenter.name,
            "-folder",
            &folder.path,
            "-pool",
            &resource_pool.path,
            "-ds",
            &datastore.name,
            "-c",
            &cpus,
            "-m",
            &memory,
            "-g",
            &spec.guest_id,
            "-firmware",
            &firmware,
            "-on=false",
            &spec.name,
        ])
        .map_err(|e| map_duplicate_name(e, &spec.name))?;

        Ok(VmRef {
            name: spec.name.clone(),
            datacenter: datacenter.name.clone(),
            inventory_path: format!("{}/{}", folder.path, spec.name),
        })
    }

    fn find_scsi_controller(&self, vm: &VmRef) -> Result<Option<String>, HypervisorError> {
        let result = self.govc(&["device.ls", "-dc", &vm.datacenter, "-vm", &vm.name])?;
        Ok(first_scsi_controller(&result.stdout))
    }

    fn add_disk(
        &self,
        vm: &VmRef,
        datastore: &DatastoreRef,
        size_gb: u64,
        disk_index: u32,
    ) -> Result<(), HypervisorError> {
        let disk_name = format!("{}/disk{}", vm.name, disk_index);
        let size = format!("{size_gb}G");

        self.govc(&[
            "vm.disk.create",
            "-dc",
            &vm.datacenter,
            "-vm",
            &vm.name,
            "-ds",
            &datastore.name,
            "-name",
            &disk_name,
            "-size",
            &size,
        ])?;
        Ok(())
    }

    fn add_network_adapter(
        &self,
        vm: &VmRef,
        network: &NetworkRef,
    ) -> Result<(), HypervisorError> {
        self.govc(&[
            "vm.network.add",
            "-dc",
            &vm.datacenter,
            "-vm",
            &vm.name,
            "-net",
            &network.name,
        ])?;
        Ok(())
    }

    fn power_on(&self, vm: &VmRef) -> Result<(), HypervisorError> {
        self.govc(&["vm.power", "-dc", &vm.datacenter, "-on", &vm.name])?;
        Ok(())
    }

    fn power_off(&self, vm: &VmRef) -> Result<(), HypervisorError> {
        self.govc(&["vm.power", "-dc", &vm.datacenter, "-off", "-force", &vm.name])?;
        Ok(())
    }

    fn destroy(&self, vm: &VmRef) -> Result<(), HypervisorError> {
        self.govc(&["vm.destroy", "-dc", &vm.datacenter, &vm.name])
            .map_err(|e| map_not_found(e, ObjectKind::Vm, &vm.name))?;
        Ok(())
    }

    fn upload_to_datastore(
        &self,
        datastore: &DatastoreRef,
        local: &Path,
        remote: &str,
    ) -> Result<(), HypervisorError> {
        let local = local.display().to_string();
        self.govc(&[
            "datastore.upload",
            "-dc",
            &datastore.datacenter,
            "-ds",
            &datastore.name,
            &local,
            remote,
        ])?;
        Ok(())
    }

    fn delete_from_datastore(
        &self,
        datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), HypervisorError> {
        self.govc(&[
            "datastore.rm",
            "-dc",
            &datastore.datacenter,
            "-ds",
            &datastore.name,
            remote,
        ])?;
        Ok(())
    }

    fn datastore_file_exists(
        &self,
        datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<bool, HypervisorError> {
        let result = self.govc(&[
            "datastore.ls",
            "-dc",
            &datastore.datacenter,
            "-ds",
            &datastore.name,
            remote,
        ]);
        match result {
            Ok(_) => Ok(true),
            Err(CommandError::ExecutionFailed { .. }) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    fn add_cdrom(&self, vm: &VmRef) -> Result<String, HypervisorError> {
        let result = self.govc(&["device.cdrom.add", "-dc", &vm.datacenter, "-vm", &vm.name])?;
        let device = result.stdout_trimmed().to_string();
        if device.is_empty() {
            return Err(HypervisorError::Parse {
                context: format!("adding a CD-ROM to '{}'", vm.name),
                message: "device name missing from output".to_string(),
            });
        }
        Ok(device)
    }

    fn insert_cdrom_media(
        &self,
        vm: &VmRef,
        device: &str,
        datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), HypervisorError> {
        self.govc(&[
            "device.cdrom.insert",
            "-dc",
            &vm.datacenter,
            "-vm",
            &vm.name,
            "-device",
            device,
            "-ds",
            &datastore.name,
            remote,
        ])?;
        Ok(())
    }

    fn connect_device(&self, vm: &VmRef, device: &str) -> Result<(), HypervisorError> {
        self.govc(&[
            "device.connect",
            "-dc",
            &vm.datacenter,
            "-vm",
            &vm.name,
            device,
        ])?;
        Ok(())
    }

    fn list_cdroms(&self, vm: &VmRef) -> Result<Vec<String>, HypervisorError> {
        let result = self.govc(&["device.ls", "-dc", &vm.datacenter, "-vm", &vm.name])?;
        Ok(cdrom_devices(&result.stdout))
    }

    fn remove_device(&self, vm: &VmRef, device: &str) -> Result<(), HypervisorError> {
        self.govc(&[
            "device.remove",
            "-dc",
            &vm.datacenter,
            "-vm",
            &vm.name,
            device,
        ])?;
        Ok(())
    }

    fn fetch_ova_import_spec(&self, url: &Url) -> Result<String, HypervisorError> {
        let result = self.govc(&["import.spec", url.as_str()])?;
        Ok(result.stdout)
    }

    fn import_ova(
        &self,
        deployment: &OvaDeployment,
        options_file: &Path,
    ) -> Result<VmRef, HypervisorError> {
        let options = options_file.display().to_string();
        let mut args = vec![
            "import.ova".to_string(),
            "-dc".to_string(),
            deployment.datacenter.name.clone(),
            "-ds".to_string(),
            deployment.datastore.name.clone(),
            "-name".to_string(),
            deployment.name.clone(),
            "-options".to_string(),
            options,
        ];
        if let Some(folder) = &deployment.folder {
            args.push("-folder".to_string());
            args.push(folder.path.clone());
        }
        if let Some(pool) = &deployment.resource_pool {
            args.push("-pool".to_string());
            args.push(pool.path.clone());
        }
        args.push(deployment.url.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.govc(&arg_refs)
            .map_err(|e| map_duplicate_name(e, &deployment.name))?;

        let folder_path = deployment
            .folder
            .as_ref()
            .map_or_else(|| Self::vm_folder_root(&deployment.datacenter), |f| f.path.clone());

        Ok(VmRef {
            name: deployment.name.clone(),
            datacenter: deployment.datacenter.name.clone(),
            inventory_path: format!("{}/{}", folder_path, deployment.name),
        })
    }
}

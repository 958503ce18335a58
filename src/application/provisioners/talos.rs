//! Talos OVA provisioner
//!
//! Talos images are immutable: no installer, no ISOs. The provisioner fetches
//! the OVF import spec for the Image Factory OVA, rewrites the VM name and
//! every network mapping to the configured values, imports the OVA, and
//! powers the VM on.

use std::io::Write;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use url::Url;

use crate::domain::profile::TalosProfile;
use crate::domain::Profile;
use crate::infrastructure::hypervisor::OvaDeployment;

use super::{
    ProfileProvisioner, ProfileResult, ProvisionError, ProvisionInput, ProvisionRuntime,
};

const IMAGE_FACTORY_BASE: &str = "https://factory.talos.dev/image";

/// Provisioner for the `talos` profile
#[derive(Debug, Default)]
pub struct TalosProvisioner {}

impl TalosProvisioner {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }

    /// Compose the Image Factory OVA URL for a schematic and version
    fn ova_url(talos: &TalosProfile) -> Result<Url, ProvisionError> {
        let raw = format!(
            "{IMAGE_FACTORY_BASE}/{}/{}/vmware-amd64.ova",
            talos.schematic_id, talos.version
        );
        Url::parse(&raw).map_err(|e| ProvisionError::InvalidOvaUrl {
            message: format!("{raw}: {e}"),
        })
    }
}

/// Rewrite `Name` and every `NetworkMapping.Network` in an OVF import spec
///
/// The spec document is JSON produced by the hypervisor's import-spec
/// capability; key casing differs between versions, so both are handled.
fn rewrite_import_spec(
    spec: &str,
    vm_name: &str,
    network_name: &str,
) -> Result<String, ProvisionError> {
    let mut doc: serde_json::Value =
        serde_json::from_str(spec).map_err(|e| ProvisionError::ImportSpec {
            message: e.to_string(),
        })?;

    let object = doc.as_object_mut().ok_or_else(|| ProvisionError::ImportSpec {
        message: "import spec is not a JSON object".to_string(),
    })?;

    let name_key = if object.contains_key("name") { "name" } else { "Name" };
    object.insert(
        name_key.to_string(),
        serde_json::Value::String(vm_name.to_string()),
    );

    let mapping_key = if object.contains_key("networkMapping") {
        "networkMapping"
    } else {
        "NetworkMapping"
    };
    if let Some(mappings) = object.get_mut(mapping_key).and_then(|v| v.as_array_mut()) {
        for mapping in mappings {
            if let Some(mapping) = mapping.as_object_mut() {
                let network_key = if mapping.contains_key("network") {
                    "network"
                } else {
                    "Network"
                };
                mapping.insert(
                    network_key.to_string(),
                    serde_json::Value::String(network_name.to_string()),
                );
            }
        }
    }

    serde_json::to_string_pretty(&doc).map_err(|e| ProvisionError::ImportSpec {
        message: e.to_string(),
    })
}

#[async_trait]
impl ProfileProvisioner for TalosProvisioner {
    fn name(&self) -> &'static str {
        "talos"
    }

    fn builds_hardware(&self) -> bool {
        // The OVA import creates the VM; building a shell VM first would trip
        // the unique-name constraint.
        false
    }

    #[instrument(name = "talos_provision", skip_all, fields(vm = %input.vm_name))]
    async fn provision_and_boot(
        &self,
        input: &ProvisionInput,
        runtime: &ProvisionRuntime,
        record: &mut ProfileResult,
    ) -> Result<(), ProvisionError> {
        let Profile::Talos(talos) = &input.config.profile else {
            return Err(ProvisionError::WrongProfile { expected: "talos" });
        };

        let url = Self::ova_url(talos)?;
        info!(
            operation = "talos_provision",
            vm = %input.vm_name,
            %url,
            "Fetching OVF import spec"
        );

        let spec = runtime.hypervisor.fetch_ova_import_spec(&url)?;
        let rewritten = rewrite_import_spec(
            &spec,
            input.vm_name.as_str(),
            &input.config.network.network_name,
        )?;

        // Staged on disk for the import tool; removed on drop, success or not.
        let mut options_file = tempfile::NamedTempFile::new()?;
        options_file.write_all(rewritten.as_bytes())?;
        debug!(
            operation = "talos_provision",
            options = %options_file.path().display(),
            "Import spec staged"
        );

        let deployment = OvaDeployment {
            url,
            name: input.vm_name.as_str().to_string(),
            network_name: input.config.network.network_name.clone(),
            datacenter: runtime.datacenter.clone(),
            datastore: runtime.datastore.clone(),
            folder: Some(runtime.folder.clone()),
            resource_pool: Some(runtime.resource_pool.clone()),
        };

        let vm = runtime
            .hypervisor
            .import_ova(&deployment, options_file.path())?;
        record.vm = Some(vm.clone());

        runtime.vm_builder.power_on(&vm)?;

        info!(
            operation = "talos_provision",
            vm = %input.vm_name,
            status = "success",
            "OVA imported and VM powered on"
        );
        Ok(())
    }

    async fn post_install(
        &self,
        input: &ProvisionInput,
        _runtime: &ProvisionRuntime,
        _record: &ProfileResult,
    ) -> Result<(), ProvisionError> {
        // Nothing was mounted; the image is immutable.
        debug!(
            operation = "talos_post_install",
            vm = %input.vm_name,
            "No post-install work for the talos profile"
        );
        Ok(())
    }
}

//! Ubuntu autoinstall provisioner
//!
//! Drives an unattended Ubuntu Server installation: renders the cloud-init
//! NoCloud documents, prepares the two ISO images, uploads and mounts them,
//! and powers the VM on. The installer reboots into the installed system on
//! its own; the install watcher observes that from the outside.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::domain::Profile;
use crate::infrastructure::cloud_init::CloudInitRenderer;

use super::{
    ProfileProvisioner, ProfileResult, ProvisionError, ProvisionInput, ProvisionRuntime,
};

/// Provisioner for the `ubuntu` profile
#[derive(Debug, Default)]
pub struct UbuntuProvisioner {
    renderer: CloudInitRenderer,
}

impl UbuntuProvisioner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            renderer: CloudInitRenderer::new(),
        }
    }
}

#[async_trait]
impl ProfileProvisioner for UbuntuProvisioner {
    fn name(&self) -> &'static str {
        "ubuntu"
    }

    #[instrument(name = "ubuntu_provision", skip_all, fields(vm = %input.vm_name))]
    async fn provision_and_boot(
        &self,
        input: &ProvisionInput,
        runtime: &ProvisionRuntime,
        record: &mut ProfileResult,
    ) -> Result<(), ProvisionError> {
        let vm = runtime.vm.as_ref().ok_or(ProvisionError::MissingVm)?;
        let Profile::Ubuntu(ubuntu) = &input.config.profile else {
            return Err(ProvisionError::WrongProfile { expected: "ubuntu" });
        };

        let documents = self.renderer.render(&input.config, ubuntu)?;

        let image = runtime.iso_manager.download_os_image(&ubuntu.version).await?;
        let (adapted, modified) = runtime.iso_manager.adapt_os_image(&image)?;
        if modified {
            info!(
                operation = "ubuntu_provision",
                vm = %input.vm_name,
                "OS image adapted for unattended install"
            );
        }
        let seed = runtime
            .iso_manager
            .create_nocloud_iso(&documents, input.vm_name.as_str())?;

        let os_remote = runtime
            .iso_manager
            .os_iso_remote_path(input.vm_name.as_str(), &ubuntu.version);
        let nocloud_remote = runtime.iso_manager.nocloud_remote_path(input.vm_name.as_str());

        // The adapted installer is content-stable per version; the seed
        // carries per-run configuration and always overwrites.
        runtime
            .iso_manager
            .upload(&runtime.iso_datastore, &adapted, &os_remote)?;
        runtime
            .iso_manager
            .upload_always(&runtime.iso_datastore, &seed, &nocloud_remote)?;
        record.nocloud_upload_path = Some(nocloud_remote.clone());

        runtime
            .iso_manager
            .mount_isos(vm, &runtime.iso_datastore, &os_remote, &nocloud_remote)?;
        runtime.vm_builder.power_on(vm)?;
        runtime.iso_manager.ensure_cdroms_connected_after_boot(vm)?;

        info!(
            operation = "ubuntu_provision",
            vm = %input.vm_name,
            status = "success",
            "Installation media mounted and VM powered on"
        );
        Ok(())
    }

    #[instrument(name = "ubuntu_post_install", skip_all, fields(vm = %input.vm_name))]
    async fn post_install(
        &self,
        input: &ProvisionInput,
        runtime: &ProvisionRuntime,
        _record: &ProfileResult,
    ) -> Result<(), ProvisionError> {
        let vm = runtime.vm.as_ref().ok_or(ProvisionError::MissingVm)?;

        // The installed system no longer needs the seed media.
        runtime.iso_manager.remove_all_cdroms(vm)?;

        let guest = runtime.hypervisor.fetch_guest_info(vm)?;
        let reported = guest.hostname.as_deref().unwrap_or_default();
        if !input.vm_name.matches_reported_hostname(reported) {
            return Err(ProvisionError::HostnameMismatch {
                expected: input.vm_name.to_string(),
                actual: if reported.is_empty() {
                    "<none>".to_string()
                } else {
                    reported.to_string()
                },
            });
        }

        info!(
            operation = "ubuntu_post_install",
            vm = %input.vm_name,
            status = "success",
            "Seed media removed and hostname verified"
        );
        Ok(())
    }
}

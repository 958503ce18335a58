//! Production ISO manager
//!
//! Downloads installer images over HTTPS with a version-keyed local cache,
//! adapts the boot configuration with xorriso, authors the NoCloud seed with
//! xorriso (falling back to genisoimage), and moves artifacts to and from the
//! datastore through the hypervisor capability surface.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::infrastructure::cloud_init::CloudInitDocuments;
use crate::infrastructure::hypervisor::{DatastoreRef, HypervisorClient, VmRef};
use crate::shared::{CommandError, CommandExecutor};

use super::{IsoError, IsoManager};

const GRUB_CONFIG_ISO_PATH: &str = "/boot/grub/grub.cfg";

/// ISO manager backed by reqwest + xorriso/genisoimage + the hypervisor
pub struct DefaultIsoManager {
    hypervisor: Arc<dyn HypervisorClient>,
    executor: CommandExecutor,
    http: reqwest::Client,
    cache_dir: PathBuf,
}

impl DefaultIsoManager {
    #[must_use]
    pub fn new(hypervisor: Arc<dyn HypervisorClient>, cache_dir: PathBuf) -> Self {
        Self {
            hypervisor,
            executor: CommandExecutor::new(),
            http: reqwest::Client::new(),
            cache_dir,
        }
    }

    fn image_url(version: &str) -> String {
        format!(
            "https://releases.ubuntu.com/{version}/ubuntu-{version}-live-server-amd64.iso"
        )
    }

    fn cached_image_path(&self, version: &str) -> PathBuf {
        self.cache_dir
            .join(format!("ubuntu-{version}-live-server-amd64.iso"))
    }

    fn io_error(path: &Path, source: std::io::Error) -> IsoError {
        IsoError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Insert `autoinstall` into every kernel command line of a grub config
    ///
    /// Returns `None` when the config already boots with autoinstall.
    fn patch_grub_config(content: &str) -> Option<String> {
        if content.contains("autoinstall") {
            return None;
        }

        let patched: String = content
            .lines()
            .map(|line| {
                let trimmed = line.trim_start();
                if trimmed.starts_with("linux") && line.contains("---") {
                    line.replacen("---", "autoinstall ---", 1)
                } else {
                    line.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        Some(patched)
    }

    fn author_seed_iso(&self, staging: &Path, output: &Path) -> Result<(), IsoError> {
        let output_str = output.display().to_string();
        let args = [
            "-output",
            output_str.as_str(),
            "-volid",
            "CIDATA",
            "-joliet",
            "-rock",
            "user-data",
            "meta-data",
            "network-config",
        ];

        let mut xorriso_args = vec!["-as", "mkisofs"];
        xorriso_args.extend_from_slice(&args);

        match self
            .executor
            .run_command("xorriso", &xorriso_args, Some(staging))
        {
            Ok(_) => return Ok(()),
            Err(CommandError::StartupFailed { .. }) => {
                debug!(
                    operation = "nocloud_iso",
                    "xorriso not available, falling back to genisoimage"
                );
            }
            Err(error) => return Err(error.into()),
        }

        match self.executor.run_command("genisoimage", &args, Some(staging)) {
            Ok(_) => Ok(()),
            Err(CommandError::StartupFailed { .. }) => Err(IsoError::NoIsoTool),
            Err(error) => Err(error.into()),
        }
    }
}

#[async_trait]
impl IsoManager for DefaultIsoManager {
    async fn download_os_image(&self, version: &str) -> Result<PathBuf, IsoError> {
        let target = self.cached_image_path(version);
        if target.exists() {
            debug!(
                operation = "os_image_download",
                version,
                path = %target.display(),
                "Using cached OS image"
            );
            return Ok(target);
        }

        fs::create_dir_all(&self.cache_dir).map_err(|e| Self::io_error(&self.cache_dir, e))?;

        let url = Self::image_url(version);
        info!(
            operation = "os_image_download",
            version,
            %url,
            "Downloading OS image"
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| IsoError::DownloadFailed {
                version: version.to_string(),
                message: e.to_string(),
            })?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.cache_dir)
            .map_err(|e| Self::io_error(&self.cache_dir, e))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IsoError::DownloadFailed {
                version: version.to_string(),
                message: e.to_string(),
            })?;
            temp.write_all(&chunk)
                .map_err(|e| Self::io_error(&target, e))?;
        }

        temp.persist(&target)
            .map_err(|e| Self::io_error(&target, e.error))?;

        info!(
            operation = "os_image_download",
            version,
            path = %target.display(),
            status = "success",
            "OS image downloaded"
        );
        Ok(target)
    }

    fn adapt_os_image(&self, local: &Path) -> Result<(PathBuf, bool), IsoError> {
        let stem = local
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("image");
        let adapted = local.with_file_name(format!("{stem}-autoinstall.iso"));

        if adapted.exists() {
            debug!(
                operation = "os_image_adapt",
                path = %adapted.display(),
                "Using previously adapted OS image"
            );
            return Ok((adapted, false));
        }

        let staging = tempfile::tempdir().map_err(|e| Self::io_error(local, e))?;
        let extracted = staging.path().join("grub.cfg");
        let local_str = local.display().to_string();
        let extracted_str = extracted.display().to_string();

        self.executor.run_command(
            "xorriso",
            &[
                "-osirrox",
                "on",
                "-indev",
                &local_str,
                "-extract",
                GRUB_CONFIG_ISO_PATH,
                &extracted_str,
            ],
            None,
        )?;

        let grub_config =
            fs::read_to_string(&extracted).map_err(|e| Self::io_error(&extracted, e))?;

        let Some(patched) = Self::patch_grub_config(&grub_config) else {
            // Image already boots unattended; reuse it as-is.
            fs::copy(local, &adapted).map_err(|e| Self::io_error(&adapted, e))?;
            return Ok((adapted, false));
        };

        fs::write(&extracted, patched).map_err(|e| Self::io_error(&extracted, e))?;
        fs::copy(local, &adapted).map_err(|e| Self::io_error(&adapted, e))?;

        let adapted_str = adapted.display().to_string();
        self.executor.run_command(
            "xorriso",
            &[
                "-dev",
                &adapted_str,
                "-boot_image",
                "any",
                "keep",
                "-update",
                &extracted_str,
                GRUB_CONFIG_ISO_PATH,
            ],
            None,
        )?;

        info!(
            operation = "os_image_adapt",
            path = %adapted.display(),
            "Boot configuration rewritten for unattended install"
        );
        Ok((adapted, true))
    }

    fn create_nocloud_iso(
        &self,
        documents: &CloudInitDocuments,
        vm_name: &str,
    ) -> Result<PathBuf, IsoError> {
        let staging = tempfile::tempdir().map_err(|e| Self::io_error(&self.cache_dir, e))?;

        for (name, content) in [
            ("user-data", &documents.user_data),
            ("meta-data", &documents.meta_data),
            ("network-config", &documents.network_config),
        ] {
            let path = staging.path().join(name);
            fs::write(&path, content).map_err(|e| Self::io_error(&path, e))?;
        }

        fs::create_dir_all(&self.cache_dir).map_err(|e| Self::io_error(&self.cache_dir, e))?;
        let output = self.cache_dir.join(format!("{vm_name}-nocloud.iso"));
        self.author_seed_iso(staging.path(), &output)?;

        info!(
            operation = "nocloud_iso",
            vm = vm_name,
            path = %output.display(),
            "NoCloud seed ISO created"
        );
        Ok(output)
    }

    fn upload(
        &self,
        datastore: &DatastoreRef,
        local: &Path,
        remote: &str,
    ) -> Result<(), IsoError> {
        if self.hypervisor.datastore_file_exists(datastore, remote)? {
            debug!(
                operation = "iso_upload",
                remote,
                datastore = %datastore.name,
                "Remote file already present, skipping upload"
            );
            return Ok(());
        }
        self.upload_always(datastore, local, remote)
    }

    fn upload_always(
        &self,
        datastore: &DatastoreRef,
        local: &Path,
        remote: &str,
    ) -> Result<(), IsoError> {
        info!(
            operation = "iso_upload",
            remote,
            datastore = %datastore.name,
            "Uploading ISO to datastore"
        );
        self.hypervisor
            .upload_to_datastore(datastore, local, remote)
            .map_err(|source| IsoError::UploadFailed {
                remote: remote.to_string(),
                source,
            })
    }

    fn mount_isos(
        &self,
        vm: &VmRef,
        datastore: &DatastoreRef,
        os_remote: &str,
        nocloud_remote: &str,
    ) -> Result<(), IsoError> {
        for remote in [os_remote, nocloud_remote] {
            let device = self.hypervisor.add_cdrom(vm)?;
            self.hypervisor
                .insert_cdrom_media(vm, &device, datastore, remote)?;
            self.hypervisor.connect_device(vm, &device)?;
            info!(
                operation = "iso_mount",
                vm = %vm.name,
                device = %device,
                remote,
                "ISO mounted"
            );
        }
        Ok(())
    }

    fn ensure_cdroms_connected_after_boot(&self, vm: &VmRef) -> Result<(), IsoError> {
        for device in self.hypervisor.list_cdroms(vm)? {
            self.hypervisor.connect_device(vm, &device)?;
        }
        Ok(())
    }

    fn remove_all_cdroms(&self, vm: &VmRef) -> Result<(), IsoError> {
        for device in self.hypervisor.list_cdroms(vm)? {
            self.hypervisor.remove_device(vm, &device)?;
            info!(
                operation = "iso_unmount",
                vm = %vm.name,
                device = %device,
                "CD-ROM removed"
            );
        }
        Ok(())
    }

    fn delete_from_datastore(
        &self,
        datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), IsoError> {
        info!(
            operation = "iso_delete",
            remote,
            datastore = %datastore.name,
            "Deleting uploaded artifact"
        );
        self.hypervisor.delete_from_datastore(datastore, remote)?;
        Ok(())
    }
}

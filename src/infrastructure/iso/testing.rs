//! Call-recording fake ISO manager for workflow tests

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::infrastructure::cloud_init::CloudInitDocuments;
use crate::infrastructure::hypervisor::{DatastoreRef, HypervisorError, VmRef};
use crate::shared::CommandError;

use super::{IsoError, IsoManager};

/// Fake ISO manager: no network, no subprocesses, scripted failures
#[derive(Default)]
pub struct FakeIsoManager {
    calls: Mutex<Vec<String>>,
    upload_failure: Mutex<Option<String>>,
}

impl FakeIsoManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload fail with the given message
    pub fn fail_uploads(&self, message: &str) {
        *self.upload_failure.lock() = Some(message.to_string());
    }

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

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn check_upload(&self, remote: &str) -> Result<(), IsoError> {
        if let Some(message) = self.upload_failure.lock().clone() {
            return Err(IsoError::UploadFailed {
                remote: remote.to_string(),
                source: HypervisorError::Command(CommandError::ExecutionFailed {
                    command: "upload".to_string(),
                    exit_code: "1".to_string(),
                    stdout: String::new(),
                    stderr: message,
                }),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IsoManager for FakeIsoManager {
    async fn download_os_image(&self, version: &str) -> Result<PathBuf, IsoError> {
        self.record(format!("download_os_image:{version}"));
        Ok(PathBuf::from(format!(
            "/tmp/fake-cache/ubuntu-{version}-live-server-amd64.iso"
        )))
    }

    fn adapt_os_image(&self, local: &Path) -> Result<(PathBuf, bool), IsoError> {
        self.record(format!("adapt_os_image:{}", local.display()));
        Ok((local.with_extension("autoinstall.iso"), true))
    }

    fn create_nocloud_iso(
        &self,
        _documents: &CloudInitDocuments,
        vm_name: &str,
    ) -> Result<PathBuf, IsoError> {
        self.record(format!("create_nocloud_iso:{vm_name}"));
        Ok(PathBuf::from(format!("/tmp/fake-cache/{vm_name}-nocloud.iso")))
    }

    fn upload(
        &self,
        _datastore: &DatastoreRef,
        _local: &Path,
        remote: &str,
    ) -> Result<(), IsoError> {
        self.record(format!("upload:{remote}"));
        self.check_upload(remote)
    }

    fn upload_always(
        &self,
        _datastore: &DatastoreRef,
        _local: &Path,
        remote: &str,
    ) -> Result<(), IsoError> {
        self.record(format!("upload_always:{remote}"));
        self.check_upload(remote)
    }

    fn mount_isos(
        &self,
        vm: &VmRef,
        _datastore: &DatastoreRef,
        os_remote: &str,
        nocloud_remote: &str,
    ) -> Result<(), IsoError> {
        self.record(format!("mount_isos:{}:{os_remote}:{nocloud_remote}", vm.name));
        Ok(())
    }

    fn ensure_cdroms_connected_after_boot(&self, vm: &VmRef) -> Result<(), IsoError> {
        self.record(format!("ensure_cdroms_connected:{}", vm.name));
        Ok(())
    }

    fn remove_all_cdroms(&self, vm: &VmRef) -> Result<(), IsoError> {
        self.record(format!("remove_all_cdroms:{}", vm.name));
        Ok(())
    }

    fn delete_from_datastore(
        &self,
        _datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), IsoError> {
        self.record(format!("delete_from_datastore:{remote}"));
        Ok(())
    }
}

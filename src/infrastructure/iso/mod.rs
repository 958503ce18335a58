//! ISO build, upload, and CD-ROM management
//!
//! The Ubuntu provisioner drives installation from two ISO images: the
//! adapted OS installer and a small NoCloud seed labeled `CIDATA`. This
//! module builds both locally, uploads them to a datastore, and manages the
//! virtual CD-ROM devices they are mounted through.

pub mod manager;
#[cfg(test)]
pub mod testing;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::infrastructure::cloud_init::CloudInitDocuments;
use crate::infrastructure::hypervisor::{DatastoreRef, HypervisorError, VmRef};
use crate::shared::CommandError;

pub use manager::DefaultIsoManager;

/// Errors from ISO operations
#[derive(Debug, Error)]
pub enum IsoError {
    #[error("failed to download OS image version '{version}': {message}")]
    DownloadFailed { version: String, message: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ISO tooling failed: {0}")]
    Tool(#[from] CommandError),

    #[error("no ISO authoring tool found (tried xorriso and genisoimage)")]
    NoIsoTool,

    #[error("failed to upload '{remote}' to datastore: {source}")]
    UploadFailed {
        remote: String,
        #[source]
        source: HypervisorError,
    },

    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),
}

/// Build, upload, and mount installation media
///
/// The two remote paths are well-known, derived from the VM name, so a
/// failed run's artifacts can always be located and deleted.
#[async_trait]
pub trait IsoManager: Send + Sync {
    /// Download the OS installer image, caching by version
    ///
    /// # Errors
    /// Returns an error when the download fails; a cached image never fails.
    async fn download_os_image(&self, version: &str) -> Result<PathBuf, IsoError>;

    /// Rewrite the image's boot configuration for unattended install
    ///
    /// Returns the adapted image path and whether an adaptation was
    /// performed (false when a previously adapted image was reused).
    ///
    /// # Errors
    /// Returns an error when the ISO tooling fails.
    fn adapt_os_image(&self, local: &Path) -> Result<(PathBuf, bool), IsoError>;

    /// Build the `CIDATA` seed ISO from the three cloud-init documents
    ///
    /// # Errors
    /// Returns an error when no ISO authoring tool is available or it fails.
    fn create_nocloud_iso(
        &self,
        documents: &CloudInitDocuments,
        vm_name: &str,
    ) -> Result<PathBuf, IsoError>;

    /// Upload unless the remote file already exists
    ///
    /// # Errors
    /// Returns `UploadFailed` when the transfer fails.
    fn upload(
        &self,
        datastore: &DatastoreRef,
        local: &Path,
        remote: &str,
    ) -> Result<(), IsoError>;

    /// Upload with overwrite semantics
    ///
    /// # Errors
    /// Returns `UploadFailed` when the transfer fails.
    fn upload_always(
        &self,
        datastore: &DatastoreRef,
        local: &Path,
        remote: &str,
    ) -> Result<(), IsoError>;

    /// Attach both ISOs as CD-ROMs, connected at power-on
    ///
    /// # Errors
    /// Returns an error when a device task fails.
    fn mount_isos(
        &self,
        vm: &VmRef,
        datastore: &DatastoreRef,
        os_remote: &str,
        nocloud_remote: &str,
    ) -> Result<(), IsoError>;

    /// Re-affirm the connection state of every CD-ROM once the guest booted
    ///
    /// # Errors
    /// Returns an error when a device task fails.
    fn ensure_cdroms_connected_after_boot(&self, vm: &VmRef) -> Result<(), IsoError>;

    /// Detach and remove every CD-ROM device
    ///
    /// # Errors
    /// Returns an error when a device task fails.
    fn remove_all_cdroms(&self, vm: &VmRef) -> Result<(), IsoError>;

    /// Delete an uploaded artifact
    ///
    /// # Errors
    /// Returns an error when the deletion fails.
    fn delete_from_datastore(
        &self,
        datastore: &DatastoreRef,
        remote: &str,
    ) -> Result<(), IsoError>;

    /// Remote path for the adapted OS installer ISO
    fn os_iso_remote_path(&self, vm_name: &str, version: &str) -> String {
        format!("{vm_name}/ubuntu-{version}-autoinstall.iso")
    }

    /// Remote path for the NoCloud seed ISO
    fn nocloud_remote_path(&self, vm_name: &str) -> String {
        format!("{vm_name}/nocloud-seed.iso")
    }
}

//! Per-profile provisioners
//!
//! A provisioner turns the validated configuration into the profile's
//! installation mechanics. Ubuntu builds and mounts installation ISOs;
//! Talos imports an immutable OVA. Both expose the same two operations, so
//! the orchestrator never branches on the profile itself.

pub mod talos;
pub mod ubuntu;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Profile, VmConfig, VmName};
use crate::infrastructure::cloud_init::CloudInitError;
use crate::infrastructure::hypervisor::{
    DatacenterRef, DatastoreRef, FolderRef, HypervisorClient, HypervisorError, NetworkRef,
    ResourcePoolRef, VmRef,
};
use crate::infrastructure::iso::{IsoError, IsoManager};
use crate::infrastructure::{VmBuilder, VmBuilderError};

pub use talos::TalosProvisioner;
pub use ubuntu::UbuntuProvisioner;

/// Projection of the configuration a provisioner works from
#[derive(Debug, Clone)]
pub struct ProvisionInput {
    pub vm_name: VmName,
    pub config: VmConfig,
}

/// Resolved collaborators and inventory objects for one bootstrap run
pub struct ProvisionRuntime {
    /// The VM built in the hardware stage; `None` for profiles that create
    /// the VM themselves (OVA import)
    pub vm: Option<VmRef>,
    pub datacenter: DatacenterRef,
    pub folder: FolderRef,
    pub resource_pool: ResourcePoolRef,
    pub datastore: DatastoreRef,
    pub network: NetworkRef,
    /// Target datastore for uploaded ISO artifacts
    pub iso_datastore: DatastoreRef,
    pub hypervisor: Arc<dyn HypervisorClient>,
    pub vm_builder: Arc<VmBuilder>,
    pub iso_manager: Arc<dyn IsoManager>,
}

/// Side effects of provisioning that cleanup and post-install must see
///
/// The provisioner records effects as they happen, so a failure later in the
/// run still leaves an accurate record for the cleanup path.
#[derive(Debug, Clone, Default)]
pub struct ProfileResult {
    /// VM created by the provisioner itself (OVA import); the orchestrator
    /// adopts this handle for the remaining stages
    pub vm: Option<VmRef>,

    /// Datastore path of the uploaded NoCloud seed, when one was uploaded
    pub nocloud_upload_path: Option<String>,
}

/// Errors from provisioning
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cloud-init rendering failed: {0}")]
    CloudInit(#[from] CloudInitError),

    #[error(transparent)]
    Iso(#[from] IsoError),

    #[error(transparent)]
    Builder(#[from] VmBuilderError),

    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    #[error("no VM handle available for provisioning")]
    MissingVm,

    #[error("profile mismatch: expected {expected}")]
    WrongProfile { expected: &'static str },

    #[error("invalid OVA URL: {message}")]
    InvalidOvaUrl { message: String },

    #[error("failed to rewrite OVF import spec: {message}")]
    ImportSpec { message: String },

    #[error("failed to stage OVF import spec: {0}")]
    SpecStaging(#[from] std::io::Error),

    #[error("guest reports hostname '{actual}', expected '{expected}'")]
    HostnameMismatch { expected: String, actual: String },
}

/// The two operations every profile implements
#[async_trait]
pub trait ProfileProvisioner: Send + Sync {
    /// Short profile identifier for logs
    fn name(&self) -> &'static str;

    /// Whether the orchestrator should build VM hardware before provisioning
    ///
    /// OVA-based profiles create the VM during import and return `false`.
    fn builds_hardware(&self) -> bool {
        true
    }

    /// Install media or import the image, then power the VM on
    ///
    /// Side effects are written into `record` as they occur so the cleanup
    /// path sees them even when a later step fails.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; `record` stays valid.
    async fn provision_and_boot(
        &self,
        input: &ProvisionInput,
        runtime: &ProvisionRuntime,
        record: &mut ProfileResult,
    ) -> Result<(), ProvisionError>;

    /// Finish up once the install watcher declared success
    ///
    /// # Errors
    ///
    /// Returns an error when post-install housekeeping fails.
    async fn post_install(
        &self,
        input: &ProvisionInput,
        runtime: &ProvisionRuntime,
        record: &ProfileResult,
    ) -> Result<(), ProvisionError>;
}

/// Resolve the provisioner for a profile
#[must_use]
pub fn resolve_provisioner(profile: &Profile) -> Arc<dyn ProfileProvisioner> {
    match profile {
        Profile::Ubuntu(_) => Arc::new(UbuntuProvisioner::new()),
        Profile::Talos(_) => Arc::new(TalosProvisioner::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_resolve_the_matching_provisioner() {
        use crate::domain::vm_config::fixtures::{talos_config, ubuntu_config};

        let ubuntu = resolve_provisioner(&ubuntu_config().profile);
        assert_eq!(ubuntu.name(), "ubuntu");
        assert!(ubuntu.builds_hardware());

        let talos = resolve_provisioner(&talos_config().profile);
        assert_eq!(talos.name(), "talos");
        assert!(!talos.builds_hardware());
    }
}

//! Bootstrap command handler implementation
//!
//! The top-level workflow: validate → connect → idempotency check → resolve
//! objects → build hardware → provision → wait for installation →
//! post-install → verify reachability. Any failure after hardware exists
//! runs the cleanup path (destroy the VM, delete recorded uploads) unless
//! the configuration opts out; cleanup logs its own errors and never masks
//! the originating one.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::application::provisioners::{
    resolve_provisioner, ProfileResult, ProvisionInput, ProvisionRuntime,
};
use crate::application::steps::{InstallWaitError, InstallWaiter};
use crate::domain::install_stats::profile_key;
use crate::domain::{BootstrapDefaults, VmConfig, VmHandle, VmName};
use crate::infrastructure::hypervisor::{
    DatacenterRef, HypervisorClient, HypervisorConnector, HypervisorError,
};
use crate::infrastructure::iso::IsoManager;
use crate::infrastructure::remote::{ReachabilityError, ReachabilityProbe, SshProbePolicy};
use crate::infrastructure::{VmBuilder, VmBuilderError};

use super::errors::{BootstrapError, BootstrapStep};

/// Builds an ISO manager bound to a session's hypervisor client
pub type IsoManagerFactory =
    Arc<dyn Fn(Arc<dyn HypervisorClient>) -> Arc<dyn IsoManager> + Send + Sync>;

/// Result type threading the failing step alongside the error
type StepResult<T> = Result<T, (BootstrapError, BootstrapStep)>;

/// `BootstrapCommandHandler` orchestrates the complete bootstrap workflow
///
/// Collaborators are injected so tests can substitute deterministic
/// implementations: the hypervisor connector, the ISO manager factory, the
/// install waiter, and the reachability probe. The provisioner is resolved
/// from the profile, which is data, not behavior to inject.
pub struct BootstrapCommandHandler {
    connector: Arc<dyn HypervisorConnector>,
    iso_manager_factory: IsoManagerFactory,
    install_waiter: Arc<dyn InstallWaiter>,
    reachability: Arc<dyn ReachabilityProbe>,
    defaults: BootstrapDefaults,
}

impl BootstrapCommandHandler {
    #[must_use]
    pub fn new(
        connector: Arc<dyn HypervisorConnector>,
        iso_manager_factory: IsoManagerFactory,
        install_waiter: Arc<dyn InstallWaiter>,
        reachability: Arc<dyn ReachabilityProbe>,
        defaults: BootstrapDefaults,
    ) -> Self {
        Self {
            connector,
            iso_manager_factory,
            install_waiter,
            reachability,
            defaults,
        }
    }

    /// Execute the complete bootstrap workflow
    ///
    /// # Errors
    ///
    /// Returns the first failing stage's error; see
    /// [`BootstrapError`](super::errors::BootstrapError) for the taxonomy.
    /// Validation failures are returned before any hypervisor call is made.
    #[instrument(
        name = "bootstrap_command",
        skip_all,
        fields(command_type = "bootstrap", vm = %config.name)
    )]
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        mut config: VmConfig,
    ) -> Result<VmHandle, BootstrapError> {
        // 1. Defaults, then validation; nothing external happens before this
        config.apply_defaults(&self.defaults);
        config.validate()?;
        let vm_name = config
            .vm_name()
            .map_err(crate::domain::ConfigValidationError::from)?;

        info!(
            command = "bootstrap",
            vm = %vm_name,
            profile = config.profile.name(),
            "Starting bootstrap workflow"
        );

        // 2. Connect; the session is released on every exit path below
        let hypervisor = self
            .connector
            .connect(&config.vcenter)
            .map_err(BootstrapError::Connect)?;

        let result = self
            .execute_connected(cancel, &config, &vm_name, Arc::clone(&hypervisor))
            .await;
        hypervisor.disconnect();

        match &result {
            Ok(handle) => {
                info!(
                    command = "bootstrap",
                    vm = %handle.name,
                    ip = %handle.ip_address,
                    ssh_ready = handle.ssh_ready,
                    "Bootstrap completed successfully"
                );
            }
            Err(error) => {
                warn!(command = "bootstrap", vm = %vm_name, %error, "Bootstrap failed");
            }
        }
        result
    }

    async fn execute_connected(
        &self,
        cancel: &CancellationToken,
        config: &VmConfig,
        vm_name: &VmName,
        hypervisor: Arc<dyn HypervisorClient>,
    ) -> Result<VmHandle, BootstrapError> {
        // 3. Idempotency: an existing VM is never ours to touch
        let datacenter = hypervisor
            .find_datacenter(&config.placement.datacenter)
            .map_err(Self::map_lookup)?;

        if hypervisor
            .find_vm(&datacenter, &config.name)
            .map_err(BootstrapError::Lookup)?
            .is_some()
        {
            return Err(BootstrapError::AlreadyExists {
                name: config.name.clone(),
                datacenter: datacenter.name,
            });
        }

        // 4. Resolve every placement object before creating anything
        let mut runtime = self
            .resolve_runtime(config, &datacenter, Arc::clone(&hypervisor))
            .map_err(Self::map_lookup)?;

        let provisioner = resolve_provisioner(&config.profile);
        let input = ProvisionInput {
            vm_name: vm_name.clone(),
            config: config.clone(),
        };
        let mut record = ProfileResult::default();

        // 5..9 with unconditional cleanup on failure
        match self
            .run_provisioned_stages(cancel, config, &input, &*provisioner, &mut runtime, &mut record)
            .await
        {
            Ok(handle) => Ok(handle),
            Err((error, step)) => {
                warn!(
                    operation = "bootstrap",
                    vm = %vm_name,
                    failed_step = %step,
                    %error,
                    "Stage failed"
                );
                if config.skip_cleanup_on_error {
                    warn!(
                        operation = "bootstrap_cleanup",
                        vm = %vm_name,
                        "skip_cleanup_on_error set, leaving partial resources in place"
                    );
                } else {
                    Self::cleanup(&runtime, &record);
                }
                Err(error)
            }
        }
    }

    fn resolve_runtime(
        &self,
        config: &VmConfig,
        datacenter: &DatacenterRef,
        hypervisor: Arc<dyn HypervisorClient>,
    ) -> Result<ProvisionRuntime, HypervisorError> {
        let folder = hypervisor.find_folder(datacenter, config.placement.folder.as_deref())?;
        let resource_pool =
            hypervisor.find_resource_pool(datacenter, config.placement.resource_pool.as_deref())?;
        let datastore = hypervisor.find_datastore(datacenter, &config.placement.datastore)?;
        let network = hypervisor.find_network(datacenter, &config.network.network_name)?;
        let iso_datastore = hypervisor.find_datastore(datacenter, config.iso_datastore_name())?;

        let vm_builder = Arc::new(VmBuilder::new(Arc::clone(&hypervisor)));
        let iso_manager = (self.iso_manager_factory)(Arc::clone(&hypervisor));

        Ok(ProvisionRuntime {
            vm: None,
            datacenter: datacenter.clone(),
            folder,
            resource_pool,
            datastore,
            network,
            iso_datastore,
            hypervisor,
            vm_builder,
            iso_manager,
        })
    }

    #[allow(clippy::too_many_lines)]
    async fn run_provisioned_stages(
        &self,
        cancel: &CancellationToken,
        config: &VmConfig,
        input: &ProvisionInput,
        provisioner: &dyn crate::application::provisioners::ProfileProvisioner,
        runtime: &mut ProvisionRuntime,
        record: &mut ProfileResult,
    ) -> StepResult<VmHandle> {
        // 5. Build hardware, except for profiles whose import creates the VM
        let step = BootstrapStep::BuildHardware;
        Self::ensure_not_cancelled(cancel, step)?;
        if provisioner.builds_hardware() {
            let spec = VmBuilder::create_spec(config);
            let vm = runtime
                .vm_builder
                .create(
                    &runtime.datacenter,
                    &runtime.folder,
                    &runtime.resource_pool,
                    &runtime.datastore,
                    &spec,
                )
                .map_err(|e| (Self::map_build(e, config), step))?;
            runtime.vm = Some(vm.clone());

            let controller = runtime
                .vm_builder
                .ensure_scsi_controller(&vm)
                .map_err(|e| (BootstrapError::Build(e), step))?;
            info!(
                operation = "bootstrap",
                vm = %vm.name,
                controller = %controller,
                "SCSI controller ready"
            );

            runtime
                .vm_builder
                .add_disk(&vm, &runtime.datastore, config.hardware.disk_gb, 0)
                .map_err(|e| (BootstrapError::Build(e), step))?;
            if let Some(data_disk_gb) = config.hardware.data_disk_gb {
                runtime
                    .vm_builder
                    .add_disk(&vm, &runtime.datastore, data_disk_gb, 1)
                    .map_err(|e| (BootstrapError::Build(e), step))?;
            }
            runtime
                .vm_builder
                .add_network_adapter(&vm, &runtime.network)
                .map_err(|e| (BootstrapError::Build(e), step))?;
        }

        // 6. Provision and boot
        let step = BootstrapStep::Provision;
        Self::ensure_not_cancelled(cancel, step)?;
        provisioner
            .provision_and_boot(input, runtime, record)
            .await
            .map_err(|e| (BootstrapError::Provision(e), step))?;
        if let Some(vm) = &record.vm {
            // Adopt the VM the provisioner created (OVA import path)
            runtime.vm = Some(vm.clone());
        }
        let vm = runtime.vm.clone().ok_or((
            BootstrapError::Provision(crate::application::provisioners::ProvisionError::MissingVm),
            step,
        ))?;

        // 7. Wait for installation
        let step = BootstrapStep::WaitForInstall;
        let stats_key = profile_key(
            config.profile.name(),
            config.profile.os_version(),
            config.hardware.cpus,
            config.hardware.memory_mb,
        );
        let install_duration = self
            .install_waiter
            .wait(
                cancel,
                Arc::clone(&runtime.hypervisor),
                &vm,
                &input.vm_name,
                &stats_key,
            )
            .await
            .map_err(|e| (Self::map_wait(e), step))?;

        // 8. Post-install housekeeping
        let step = BootstrapStep::PostInstall;
        Self::ensure_not_cancelled(cancel, step)?;
        provisioner
            .post_install(input, runtime, record)
            .await
            .map_err(|e| (BootstrapError::Provision(e), step))?;

        // 9. Verify reachability
        let step = BootstrapStep::VerifySsh;
        let ip_address = config
            .network
            .parsed_ip()
            .map_err(|e| (BootstrapError::InvalidConfig(e), step))?;
        let ssh_ready = if config.skip_ssh_verify {
            info!(operation = "bootstrap", vm = %vm.name, "Skipping SSH verification");
            false
        } else {
            let policy = SshProbePolicy::from_defaults(&self.defaults);
            self.reachability
                .wait_reachable(cancel, ip_address, &policy)
                .await
                .map_err(|e| (Self::map_reachability(e), step))?;
            true
        };

        // 10. Success; the watcher already recorded the duration sample
        Ok(VmHandle {
            name: input.vm_name.clone(),
            ip_address,
            hostname: input.vm_name.as_str().to_string(),
            ssh_ready,
            install_duration: Some(install_duration),
        })
    }

    /// Destroy the partial VM and delete recorded uploads, best effort
    fn cleanup(runtime: &ProvisionRuntime, record: &ProfileResult) {
        info!(operation = "bootstrap_cleanup", "Cleaning up after failed bootstrap");

        let vm = record.vm.as_ref().or(runtime.vm.as_ref());
        if let Some(vm) = vm {
            if let Err(error) = runtime.vm_builder.delete(vm) {
                warn!(
                    operation = "bootstrap_cleanup",
                    vm = %vm.name,
                    %error,
                    "Failed to destroy partial VM"
                );
            }
        }

        if let Some(remote) = &record.nocloud_upload_path {
            if let Err(error) = runtime
                .iso_manager
                .delete_from_datastore(&runtime.iso_datastore, remote)
            {
                warn!(
                    operation = "bootstrap_cleanup",
                    remote = %remote,
                    %error,
                    "Failed to delete uploaded seed ISO"
                );
            }
        }
    }

    fn ensure_not_cancelled(
        cancel: &CancellationToken,
        step: BootstrapStep,
    ) -> StepResult<()> {
        if cancel.is_cancelled() {
            return Err((BootstrapError::Cancelled, step));
        }
        Ok(())
    }

    fn map_lookup(error: HypervisorError) -> BootstrapError {
        match error {
            HypervisorError::NotFound { kind, name } => BootstrapError::NotFound { kind, name },
            other => BootstrapError::Lookup(other),
        }
    }

    fn map_build(error: VmBuilderError, config: &VmConfig) -> BootstrapError {
        match error {
            // Two runs raced past the idempotency check; the hypervisor's
            // unique-name constraint is the arbiter.
            VmBuilderError::DuplicateName { name } => BootstrapError::AlreadyExists {
                name,
                datacenter: config.placement.datacenter.clone(),
            },
            other => BootstrapError::Build(other),
        }
    }

    fn map_wait(error: InstallWaitError) -> BootstrapError {
        match error {
            InstallWaitError::Timeout { timeout } => BootstrapError::InstallTimeout { timeout },
            InstallWaitError::Cancelled => BootstrapError::Cancelled,
        }
    }

    fn map_reachability(error: ReachabilityError) -> BootstrapError {
        match error {
            ReachabilityError::Cancelled => BootstrapError::Cancelled,
            other => BootstrapError::Unreachable(other),
        }
    }
}

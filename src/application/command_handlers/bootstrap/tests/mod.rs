//! Bootstrap workflow scenario tests
//!
//! Every scenario runs the real handler and real provisioners against the
//! fake hypervisor and fake ISO manager, with the install waiter and
//! reachability probe stubbed to deterministic outcomes.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::application::steps::{InstallWaitError, InstallWaiter};
use crate::domain::vm_config::fixtures::{talos_config, ubuntu_config};
use crate::infrastructure::hypervisor::testing::FakeHypervisorClient;
use crate::infrastructure::hypervisor::{HypervisorClient, HypervisorConnector, HypervisorError, VmRef};
use crate::infrastructure::iso::testing::FakeIsoManager;
use crate::infrastructure::remote::{ReachabilityError, ReachabilityProbe, SshProbePolicy};

use super::errors::BootstrapError;
use super::handler::BootstrapCommandHandler;

struct FakeConnector {
    client: Arc<FakeHypervisorClient>,
}

impl HypervisorConnector for FakeConnector {
    fn connect(
        &self,
        _connection: &crate::domain::vm_config::VcenterConnection,
    ) -> Result<Arc<dyn HypervisorClient>, HypervisorError> {
        self.client.connect()?;
        Ok(Arc::clone(&self.client) as Arc<dyn HypervisorClient>)
    }
}

/// Install waiter stub: succeeds immediately or fails with a scripted error
struct StubInstallWaiter {
    failure: Mutex<Option<InstallWaitError>>,
}

impl StubInstallWaiter {
    fn succeeding() -> Self {
        Self {
            failure: Mutex::new(None),
        }
    }

    fn failing(error: InstallWaitError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
        }
    }
}

#[async_trait]
impl InstallWaiter for StubInstallWaiter {
    async fn wait(
        &self,
        _cancel: &CancellationToken,
        _hypervisor: Arc<dyn HypervisorClient>,
        _vm: &VmRef,
        _expected_hostname: &crate::domain::VmName,
        _stats_key: &str,
    ) -> Result<Duration, InstallWaitError> {
        match self.failure.lock().take() {
            Some(error) => Err(error),
            None => Ok(Duration::from_secs(300)),
        }
    }
}

/// Reachability stub
struct StubProbe {
    reachable: bool,
}

#[async_trait]
impl ReachabilityProbe for StubProbe {
    async fn wait_reachable(
        &self,
        _cancel: &CancellationToken,
        ip: Ipv4Addr,
        policy: &SshProbePolicy,
    ) -> Result<u32, ReachabilityError> {
        if self.reachable {
            Ok(1)
        } else {
            Err(ReachabilityError::Unreachable {
                ip,
                port: policy.port,
                attempts: policy.retries,
            })
        }
    }
}

struct Scenario {
    hypervisor: Arc<FakeHypervisorClient>,
    iso: Arc<FakeIsoManager>,
    handler: BootstrapCommandHandler,
}

fn scenario_with(waiter: StubInstallWaiter, ssh_reachable: bool) -> Scenario {
    let hypervisor = Arc::new(FakeHypervisorClient::new());
    let iso = Arc::new(FakeIsoManager::new());

    let iso_for_factory = Arc::clone(&iso);
    let handler = BootstrapCommandHandler::new(
        Arc::new(FakeConnector {
            client: Arc::clone(&hypervisor),
        }),
        Arc::new(move |_client| {
            Arc::clone(&iso_for_factory) as Arc<dyn crate::infrastructure::iso::IsoManager>
        }),
        Arc::new(waiter),
        Arc::new(StubProbe {
            reachable: ssh_reachable,
        }),
        crate::domain::BootstrapDefaults::standard(),
    );

    // Post-install re-verifies the guest hostname; give the fake one
    // telemetry snapshot reporting the expected name.
    hypervisor.push_guest_info(true, "test-vm");

    Scenario {
        hypervisor,
        iso,
        handler,
    }
}

fn scenario() -> Scenario {
    scenario_with(StubInstallWaiter::succeeding(), true)
}

#[tokio::test]
async fn it_should_reject_invalid_config_without_touching_the_hypervisor() {
    let scenario = scenario();
    let mut config = ubuntu_config();
    config.network.gateway = "not-an-ip".to_string();

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), config)
        .await;

    assert!(matches!(result, Err(BootstrapError::InvalidConfig(_))));
    assert!(scenario.hypervisor.calls().is_empty());
}

#[tokio::test]
async fn it_should_bootstrap_the_ubuntu_happy_path() {
    let scenario = scenario();

    let handle = scenario
        .handler
        .execute(&CancellationToken::new(), ubuntu_config())
        .await
        .unwrap();

    assert_eq!(handle.name.as_str(), "test-vm");
    assert_eq!(handle.ip_address, Ipv4Addr::new(192, 168, 1, 10));
    assert_eq!(handle.hostname, "test-vm");
    assert!(handle.ssh_ready);

    // One OS disk only, no cleanup
    assert_eq!(scenario.hypervisor.count_calls("add_disk:"), 1);
    assert_eq!(scenario.hypervisor.count_calls("add_disk:test-vm:20:0"), 1);
    assert_eq!(scenario.hypervisor.count_calls("destroy"), 0);
    assert_eq!(scenario.iso.count_calls("delete_from_datastore"), 0);
    assert_eq!(scenario.hypervisor.count_calls("power_on"), 1);
    assert_eq!(scenario.iso.count_calls("remove_all_cdroms"), 1);
    assert_eq!(scenario.hypervisor.count_calls("disconnect"), 1);
}

#[tokio::test]
async fn it_should_add_both_disks_on_the_same_controller_with_a_data_disk() {
    let scenario = scenario();
    let mut config = ubuntu_config();
    config.hardware.data_disk_gb = Some(100);
    config.hardware.data_disk_mount_path = Some("/data".to_string());

    scenario
        .handler
        .execute(&CancellationToken::new(), config)
        .await
        .unwrap();

    assert_eq!(scenario.hypervisor.count_calls("add_disk:"), 2);
    assert_eq!(scenario.hypervisor.count_calls("add_disk:test-vm:20:0"), 1);
    assert_eq!(scenario.hypervisor.count_calls("add_disk:test-vm:100:1"), 1);
}

#[tokio::test]
async fn it_should_refuse_to_touch_an_existing_vm() {
    let scenario = scenario();
    scenario.hypervisor.add_existing_vm("test-vm");

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), ubuntu_config())
        .await;

    let error = result.unwrap_err();
    assert!(error.to_string().contains("already exists"));

    assert_eq!(scenario.hypervisor.count_calls("create_vm"), 0);
    assert_eq!(scenario.hypervisor.count_calls("add_disk"), 0);
    assert_eq!(scenario.hypervisor.count_calls("power_on"), 0);
    assert_eq!(scenario.iso.count_calls("upload"), 0);
    // Never destroy a VM we did not create
    assert_eq!(scenario.hypervisor.count_calls("destroy"), 0);
}

#[tokio::test]
async fn it_should_destroy_the_vm_when_an_upload_fails() {
    let scenario = scenario();
    scenario.iso.fail_uploads("upload failed");

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), ubuntu_config())
        .await;

    let error = result.unwrap_err();
    assert!(error.to_string().contains("upload"));

    assert_eq!(scenario.hypervisor.count_calls("destroy:test-vm"), 1);
    // The seed was never uploaded, so there is nothing recorded to delete
    assert_eq!(scenario.iso.count_calls("delete_from_datastore"), 0);
}

#[tokio::test]
async fn it_should_clean_up_vm_and_seed_when_ssh_verification_fails() {
    let scenario = scenario_with(StubInstallWaiter::succeeding(), false);

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), ubuntu_config())
        .await;

    let error = result.unwrap_err();
    assert!(error.to_string().contains("SSH"));

    assert_eq!(scenario.hypervisor.count_calls("destroy:test-vm"), 1);
    assert_eq!(
        scenario
            .iso
            .count_calls("delete_from_datastore:test-vm/nocloud-seed.iso"),
        1
    );
}

#[tokio::test]
async fn it_should_leave_everything_in_place_with_skip_cleanup_on_error() {
    let scenario = scenario_with(StubInstallWaiter::succeeding(), false);
    let mut config = ubuntu_config();
    config.skip_cleanup_on_error = true;

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), config)
        .await;

    assert!(result.is_err());
    assert_eq!(scenario.hypervisor.count_calls("destroy"), 0);
    assert_eq!(scenario.iso.count_calls("delete_from_datastore"), 0);
}

#[tokio::test]
async fn it_should_map_install_timeout_and_run_cleanup() {
    let scenario = scenario_with(
        StubInstallWaiter::failing(InstallWaitError::Timeout {
            timeout: Duration::from_secs(45 * 60),
        }),
        true,
    );

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), ubuntu_config())
        .await;

    assert!(matches!(result, Err(BootstrapError::InstallTimeout { .. })));
    assert_eq!(scenario.hypervisor.count_calls("destroy:test-vm"), 1);
}

#[tokio::test]
async fn it_should_return_cancelled_and_clean_up_when_the_watcher_is_cancelled() {
    let scenario = scenario_with(
        StubInstallWaiter::failing(InstallWaitError::Cancelled),
        true,
    );

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), ubuntu_config())
        .await;

    assert!(matches!(result, Err(BootstrapError::Cancelled)));
    assert_eq!(scenario.hypervisor.count_calls("destroy:test-vm"), 1);
}

#[tokio::test]
async fn it_should_not_verify_ssh_when_skipped() {
    let scenario = scenario_with(StubInstallWaiter::succeeding(), false);
    let mut config = ubuntu_config();
    config.skip_ssh_verify = true;

    let handle = scenario
        .handler
        .execute(&CancellationToken::new(), config)
        .await
        .unwrap();

    // The probe would have failed; skipping means it never ran
    assert!(!handle.ssh_ready);
}

#[tokio::test]
async fn it_should_bootstrap_talos_via_ova_import() {
    let scenario = scenario();

    let handle = scenario
        .handler
        .execute(&CancellationToken::new(), talos_config())
        .await
        .unwrap();

    assert_eq!(handle.name.as_str(), "talos-vm");
    assert!(handle.ssh_ready);

    // No shell VM, no disks, no ISOs: the import creates everything
    assert_eq!(scenario.hypervisor.count_calls("create_vm"), 0);
    assert_eq!(scenario.hypervisor.count_calls("add_disk"), 0);
    assert_eq!(scenario.iso.count_calls("upload"), 0);
    assert_eq!(scenario.hypervisor.count_calls("import_ova:talos-vm"), 1);
    assert_eq!(scenario.hypervisor.count_calls("power_on:talos-vm"), 1);
}

#[tokio::test]
async fn it_should_destroy_an_imported_talos_vm_on_later_failure() {
    let scenario = scenario_with(StubInstallWaiter::succeeding(), false);

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), talos_config())
        .await;

    assert!(result.is_err());
    assert_eq!(scenario.hypervisor.count_calls("destroy:talos-vm"), 1);
}

#[tokio::test]
async fn it_should_report_missing_inventory_objects_without_cleanup() {
    let scenario = scenario();
    scenario.hypervisor.set_missing_object("LAN");

    let result = scenario
        .handler
        .execute(&CancellationToken::new(), ubuntu_config())
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, BootstrapError::NotFound { .. }));
    assert!(error.to_string().contains("LAN"));
    assert_eq!(scenario.hypervisor.count_calls("create_vm"), 0);
    assert_eq!(scenario.hypervisor.count_calls("destroy"), 0);
}

//! Installation-progress watcher
//!
//! Detects "installation complete" using only guest telemetry exposed by
//! VMware Tools and the final hostname. The watcher is a poll-driven state
//! machine:
//!
//! - waiting for Tools to come up for the first time (installer booted);
//! - Tools going from running to not-running means the installer triggered
//!   its post-install reboot;
//! - after that, the guest hostname must match the configured name for a
//!   number of consecutive polls before success is declared.
//!
//! Profiles whose installer runs inside the final boot environment (no
//! reboot) complete through the same stable-hostname rule before any reboot
//! is seen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{BootstrapDefaults, InstallStatsStore, VmName};
use crate::infrastructure::hypervisor::{GuestInfo, HypervisorClient, ToolsStatus, VmRef};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Watcher tuning, sourced from the defaults table
#[derive(Debug, Clone)]
pub struct InstallWatchConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub required_hostname_checks: u32,
    pub service_startup_wait: Duration,
}

impl InstallWatchConfig {
    #[must_use]
    pub fn from_defaults(defaults: &BootstrapDefaults) -> Self {
        Self {
            poll_interval: defaults.install_poll_interval,
            timeout: defaults.install_timeout,
            required_hostname_checks: defaults.required_hostname_checks,
            service_startup_wait: defaults.service_startup_wait,
        }
    }
}

/// Errors from the install watcher
#[derive(Debug, Error)]
pub enum InstallWaitError {
    #[error("installation did not complete within {} minutes", timeout.as_secs() / 60)]
    Timeout { timeout: Duration },

    #[error("install watcher cancelled")]
    Cancelled,
}

/// Hook the orchestrator waits for installation through
///
/// Production wires [`InstallWatcher`]; tests substitute a stub.
#[async_trait]
pub trait InstallWaiter: Send + Sync {
    /// Block until installation completes, fails, or the deadline elapses
    ///
    /// Returns the observed install duration.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the deadline elapses, `Cancelled` on
    /// cancellation.
    async fn wait(
        &self,
        cancel: &CancellationToken,
        hypervisor: Arc<dyn HypervisorClient>,
        vm: &VmRef,
        expected_hostname: &VmName,
        stats_key: &str,
    ) -> Result<Duration, InstallWaitError>;
}

/// Outcome of one telemetry observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchOutcome {
    Continue,
    Complete,
}

/// Per-run watcher state
///
/// `tools_was_running` and `reboot_detected` together encode the four
/// states: neither set = waiting for Tools; `tools_was_running` only =
/// pre-reboot; `reboot_detected` only = waiting for Tools to return;
/// both = waiting for a stable hostname.
#[derive(Debug)]
struct InstallWatchState {
    tools_was_running: bool,
    reboot_detected: bool,
    hostname_check_count: u32,
    required_hostname_checks: u32,
}

impl InstallWatchState {
    fn new(required_hostname_checks: u32) -> Self {
        Self {
            tools_was_running: false,
            reboot_detected: false,
            hostname_check_count: 0,
            required_hostname_checks: required_hostname_checks.max(1),
        }
    }

    /// Apply one telemetry snapshot
    fn observe(
        &mut self,
        tools_running: bool,
        hostname: Option<&str>,
        expected_hostname: &VmName,
    ) -> WatchOutcome {
        if !self.tools_was_running && tools_running {
            self.tools_was_running = true;
            if self.reboot_detected {
                debug!(
                    operation = "install_watch",
                    "Tools returned after reboot, watching hostname"
                );
            } else {
                debug!(operation = "install_watch", "Tools running for the first time");
            }
        } else if self.tools_was_running && !tools_running {
            if !self.reboot_detected {
                info!(
                    operation = "install_watch",
                    "Tools stopped, installer reboot detected"
                );
                self.reboot_detected = true;
            }
            self.tools_was_running = false;
            self.hostname_check_count = 0;
            return WatchOutcome::Continue;
        }

        if !tools_running {
            return WatchOutcome::Continue;
        }

        // Stable-hostname rule; applies pre-reboot too, for installers that
        // finish inside the final boot environment. The guest may report the
        // name qualified or re-cased, so VmName owns the comparison.
        if hostname.is_some_and(|reported| expected_hostname.matches_reported_hostname(reported)) {
            self.hostname_check_count += 1;
            debug!(
                operation = "install_watch",
                checks = self.hostname_check_count,
                required = self.required_hostname_checks,
                "Hostname matches"
            );
            if self.hostname_check_count >= self.required_hostname_checks {
                return WatchOutcome::Complete;
            }
        } else if self.hostname_check_count > 0 {
            debug!(
                operation = "install_watch",
                hostname = hostname.unwrap_or("<none>"),
                "Hostname regressed, resetting stability counter"
            );
            self.hostname_check_count = 0;
        }

        WatchOutcome::Continue
    }
}

/// Production install watcher
pub struct InstallWatcher {
    config: InstallWatchConfig,
    stats: Arc<InstallStatsStore>,
}

impl InstallWatcher {
    #[must_use]
    pub fn new(config: InstallWatchConfig, stats: Arc<InstallStatsStore>) -> Self {
        Self { config, stats }
    }

    /// Whether a snapshot carries any usable guest information
    fn has_guest_information(guest: &GuestInfo) -> bool {
        guest.tools_status != ToolsStatus::Unknown || guest.hostname.is_some()
    }

    fn heartbeat(elapsed: Duration, estimate: Option<Duration>) {
        match estimate {
            Some(estimate) => {
                let remaining = estimate.saturating_sub(elapsed);
                info!(
                    operation = "install_watch",
                    elapsed_secs = elapsed.as_secs(),
                    eta_secs = remaining.as_secs(),
                    "Waiting for installation to complete"
                );
            }
            None => {
                info!(
                    operation = "install_watch",
                    elapsed_secs = elapsed.as_secs(),
                    "Waiting for installation to complete"
                );
            }
        }
    }
}

#[async_trait]
impl InstallWaiter for InstallWatcher {
    async fn wait(
        &self,
        cancel: &CancellationToken,
        hypervisor: Arc<dyn HypervisorClient>,
        vm: &VmRef,
        expected_hostname: &VmName,
        stats_key: &str,
    ) -> Result<Duration, InstallWaitError> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let estimate = self.stats.median(stats_key);
        let mut state = InstallWatchState::new(self.config.required_hostname_checks);
        let mut last_heartbeat: Option<Instant> = None;

        info!(
            operation = "install_watch",
            vm = %vm.name,
            expected_hostname = %expected_hostname,
            timeout_secs = self.config.timeout.as_secs(),
            eta_secs = estimate.map(|e| e.as_secs()),
            "Watching installation progress"
        );

        loop {
            if cancel.is_cancelled() {
                return Err(InstallWaitError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(InstallWaitError::Timeout {
                    timeout: self.config.timeout,
                });
            }

            match hypervisor.fetch_guest_info(vm) {
                Ok(guest) if Self::has_guest_information(&guest) => {
                    let outcome = state.observe(
                        guest.tools_status.is_running(),
                        guest.hostname.as_deref(),
                        expected_hostname,
                    );

                    if outcome == WatchOutcome::Complete {
                        info!(
                            operation = "install_watch",
                            vm = %vm.name,
                            elapsed_secs = started.elapsed().as_secs(),
                            "Installation complete, waiting for services to start"
                        );

                        tokio::select! {
                            () = cancel.cancelled() => return Err(InstallWaitError::Cancelled),
                            () = tokio::time::sleep(self.config.service_startup_wait) => {}
                        }

                        let elapsed = started.elapsed();
                        if let Err(error) = self.stats.record(stats_key, elapsed) {
                            warn!(
                                operation = "install_watch",
                                %error,
                                "Could not record install duration sample"
                            );
                        }
                        return Ok(elapsed);
                    }
                }
                Ok(_) | Err(_) => {
                    // No usable telemetry this tick; neither advances nor
                    // rewinds the state, and the deadline keeps running in
                    // real time only.
                }
            }

            let due = last_heartbeat.map_or(true, |at| at.elapsed() >= HEARTBEAT_INTERVAL);
            if due {
                Self::heartbeat(started.elapsed(), estimate);
                last_heartbeat = Some(Instant::now());
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(InstallWaitError::Cancelled),
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::domain::install_stats::profile_key;
    use crate::infrastructure::hypervisor::testing::FakeHypervisorClient;
    use crate::shared::SystemClock;

    fn fast_config(required_hostname_checks: u32) -> InstallWatchConfig {
        InstallWatchConfig {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
            required_hostname_checks,
            service_startup_wait: Duration::ZERO,
        }
    }

    fn stats_store(dir: &TempDir) -> Arc<InstallStatsStore> {
        Arc::new(InstallStatsStore::new(
            dir.path().join("stats.json"),
            Arc::new(SystemClock),
        ))
    }

    fn vm() -> VmRef {
        VmRef {
            name: "test-vm".to_string(),
            datacenter: "DC1".to_string(),
            inventory_path: "/DC1/vm/test-vm".to_string(),
        }
    }

    mod state_machine {
        use super::super::{InstallWatchState, WatchOutcome};
        use crate::domain::VmName;

        fn expected() -> VmName {
            VmName::new("test-vm").unwrap()
        }

        #[test]
        fn it_should_complete_through_the_reboot_path() {
            let mut state = InstallWatchState::new(1);

            // installer boots, runs, reboots, final system comes up
            assert_eq!(state.observe(false, None, &expected()), WatchOutcome::Continue);
            assert_eq!(
                state.observe(true, Some("temp"), &expected()),
                WatchOutcome::Continue
            );
            assert_eq!(
                state.observe(true, Some("temp"), &expected()),
                WatchOutcome::Continue
            );
            assert_eq!(state.observe(false, None, &expected()), WatchOutcome::Continue);
            assert!(state.reboot_detected);
            assert_eq!(
                state.observe(true, Some("test-vm"), &expected()),
                WatchOutcome::Complete
            );
        }

        #[test]
        fn it_should_accept_a_qualified_or_recased_hostname_report() {
            let mut state = InstallWatchState::new(2);

            // DNS comes up mid-count and the guest starts qualifying the name
            state.observe(true, Some("TEST-VM"), &expected());
            assert_eq!(
                state.observe(true, Some("test-vm.localdomain"), &expected()),
                WatchOutcome::Complete
            );
        }

        #[test]
        fn it_should_complete_without_a_reboot_for_in_place_installers() {
            let mut state = InstallWatchState::new(2);

            assert_eq!(
                state.observe(true, Some("test-vm"), &expected()),
                WatchOutcome::Continue
            );
            assert_eq!(
                state.observe(true, Some("test-vm"), &expected()),
                WatchOutcome::Complete
            );
            assert!(!state.reboot_detected);
        }

        #[test]
        fn it_should_reset_the_counter_when_the_hostname_regresses() {
            let mut state = InstallWatchState::new(2);

            state.observe(true, Some("test-vm"), &expected());
            assert_eq!(state.hostname_check_count, 1);

            state.observe(true, Some("ubuntu-server"), &expected());
            assert_eq!(state.hostname_check_count, 0);

            state.observe(true, Some("test-vm"), &expected());
            assert_eq!(
                state.observe(true, Some("test-vm"), &expected()),
                WatchOutcome::Complete
            );
        }

        #[test]
        fn it_should_require_at_least_one_matching_poll() {
            // A zero configuration still needs one observation.
            let mut state = InstallWatchState::new(0);
            assert_eq!(state.required_hostname_checks, 1);
            assert_eq!(
                state.observe(true, Some("test-vm"), &expected()),
                WatchOutcome::Complete
            );
        }

        #[test]
        fn it_should_reset_the_counter_on_a_second_reboot_signal() {
            let mut state = InstallWatchState::new(3);

            state.observe(true, Some("test-vm"), &expected());
            state.observe(true, Some("test-vm"), &expected());
            // tools drop again mid-count
            state.observe(false, None, &expected());
            assert_eq!(state.hostname_check_count, 0);
        }
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn it_should_log_the_watch_start_with_the_expected_hostname() {
        let dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeHypervisorClient::new());
        fake.push_guest_info(true, "test-vm");

        let watcher = InstallWatcher::new(fast_config(1), stats_store(&dir));
        watcher
            .wait(
                &CancellationToken::new(),
                fake,
                &vm(),
                &VmName::new("test-vm").unwrap(),
                "k",
            )
            .await
            .unwrap();

        assert!(logs_contain("Watching installation progress"));
        assert!(logs_contain("Installation complete"));
    }

    #[tokio::test]
    async fn it_should_succeed_on_the_reboot_poll_sequence_and_record_a_sample() {
        let dir = TempDir::new().unwrap();
        let stats = stats_store(&dir);
        let fake = Arc::new(FakeHypervisorClient::new());

        // (tools, hostname) per poll, as seen from the hypervisor
        fake.push_guest_info(false, "");
        fake.push_guest_info(true, "temp");
        fake.push_guest_info(true, "temp");
        fake.push_guest_info(false, "");
        fake.push_guest_info(true, "test-vm");

        let watcher = InstallWatcher::new(fast_config(1), stats.clone());
        let key = profile_key("ubuntu", "24.04", 2, 2048);

        let duration = watcher
            .wait(
                &CancellationToken::new(),
                fake.clone(),
                &vm(),
                &VmName::new("test-vm").unwrap(),
                &key,
            )
            .await
            .unwrap();

        assert_eq!(fake.count_calls("fetch_guest_info"), 5);
        assert!(duration <= Duration::from_secs(5));

        let recorded = stats.load();
        assert_eq!(recorded.profiles[&key].samples_sec.len(), 1);
    }

    #[tokio::test]
    async fn it_should_time_out_when_the_guest_never_settles() {
        let dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeHypervisorClient::new());
        fake.push_guest_info(true, "ubuntu-server");

        let mut config = fast_config(1);
        config.timeout = Duration::from_millis(30);
        let watcher = InstallWatcher::new(config, stats_store(&dir));

        let result = watcher
            .wait(
                &CancellationToken::new(),
                fake,
                &vm(),
                &VmName::new("test-vm").unwrap(),
                "k",
            )
            .await;

        assert!(matches!(result, Err(InstallWaitError::Timeout { .. })));
    }

    #[tokio::test]
    async fn it_should_return_cancelled_when_the_token_fires() {
        let dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeHypervisorClient::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let watcher = InstallWatcher::new(fast_config(1), stats_store(&dir));
        let result = watcher
            .wait(&cancel, fake, &vm(), &VmName::new("test-vm").unwrap(), "k")
            .await;

        assert!(matches!(result, Err(InstallWaitError::Cancelled)));
    }

    #[tokio::test]
    async fn it_should_skip_ticks_with_no_usable_telemetry() {
        let dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeHypervisorClient::new());

        // two failing fetches, then a straight completion
        fake.push_guest_fetch_error();
        fake.push_guest_fetch_error();
        fake.push_guest_info(true, "test-vm");

        let watcher = InstallWatcher::new(fast_config(1), stats_store(&dir));
        let result = watcher
            .wait(
                &CancellationToken::new(),
                fake.clone(),
                &vm(),
                &VmName::new("test-vm").unwrap(),
                "k",
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(fake.count_calls("fetch_guest_info"), 3);
    }
}

//! Application wiring and command dispatch
//!
//! Builds the production dependency graph (govc connector, ISO manager,
//! install watcher, TCP probe), races a ctrl-c handler against the selected
//! command, and renders outcomes: `Error: <message>` with an optional
//! `Hint: <text>`, or a single `Cancelled.` line on interrupt.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::application::command_handlers::bootstrap::IsoManagerFactory;
use crate::application::command_handlers::{
    BootstrapCommandHandler, BootstrapError, DeleteCommandHandler, RecreateCommandHandler,
    RecreateError, UpgradeCommandHandler, UpgradeOptions,
};
use crate::application::steps::{InstallWatchConfig, InstallWatcher};
use crate::domain::{
    BootstrapDefaults, BootstrapResult, InstallStatsStore, Profile, VmConfig, VmHandle,
    DEFAULT_SSH_PORT,
};
use crate::infrastructure::hypervisor::GovcConnector;
use crate::infrastructure::iso::{DefaultIsoManager, IsoManager};
use crate::infrastructure::remote::{HostKeyScanner, TcpPortProbe};
use crate::infrastructure::talosctl::TalosctlClient;
use crate::logging::LoggingBuilder;
use crate::presentation::cli::{Cli, Commands};
use crate::presentation::config_loader::load_vm_config;
use crate::shared::SystemClock;

const EXIT_CODE_CANCELLED: u8 = 130;

/// How a command run ended, as seen by the terminal
enum Outcome {
    Success,
    Cancelled,
    Failed {
        message: String,
        hint: Option<String>,
    },
}

/// Main application entry point
pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingBuilder::new(
        cli.log_format.clone(),
        cli.log_output.clone(),
        cli.log_dir.clone(),
    );
    let _logging_guard = match logging.init() {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("Error: {error}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    match dispatch(cli, &cancel).await {
        Outcome::Success => ExitCode::SUCCESS,
        Outcome::Cancelled => {
            println!("Cancelled.");
            ExitCode::from(EXIT_CODE_CANCELLED)
        }
        Outcome::Failed { message, hint } => {
            eprintln!("Error: {message}");
            if let Some(hint) = hint {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Cancel the run on the first interrupt; the workflow observes the token
/// at its next suspension point and begins cleanup.
fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(operation = "signal", "Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

async fn dispatch(cli: Cli, cancel: &CancellationToken) -> Outcome {
    match cli.command {
        Commands::Bootstrap {
            config,
            output,
            ssh_key_path,
        } => {
            let config = match load_vm_config(&config) {
                Ok(config) => config,
                Err(error) => return fail(&error, None),
            };
            let handler = build_bootstrap_handler(&cli.data_dir);
            match handler.execute(cancel, config.clone()).await {
                Ok(handle) => finish_bootstrap(&handle, &config, output.as_deref(), &ssh_key_path),
                Err(BootstrapError::Cancelled) => Outcome::Cancelled,
                Err(error) => {
                    let hint = error.hint().map(ToString::to_string);
                    fail(&error, hint)
                }
            }
        }

        Commands::Delete { config } => {
            let config = match load_vm_config(&config) {
                Ok(config) => config,
                Err(error) => return fail(&error, None),
            };
            let handler = DeleteCommandHandler::new(Arc::new(GovcConnector::new()));
            match handler.execute(&config).await {
                Ok(()) => {
                    println!("VM '{}' deleted.", config.name);
                    Outcome::Success
                }
                Err(error) => fail(&error, None),
            }
        }

        Commands::Recreate {
            config,
            output,
            ssh_key_path,
        } => {
            let config = match load_vm_config(&config) {
                Ok(config) => config,
                Err(error) => return fail(&error, None),
            };
            let handler = RecreateCommandHandler::new(
                DeleteCommandHandler::new(Arc::new(GovcConnector::new())),
                build_bootstrap_handler(&cli.data_dir),
            );
            match handler.execute(cancel, config.clone()).await {
                Ok(handle) => finish_bootstrap(&handle, &config, output.as_deref(), &ssh_key_path),
                Err(RecreateError::Bootstrap(BootstrapError::Cancelled)) => Outcome::Cancelled,
                Err(RecreateError::Bootstrap(error)) => {
                    let hint = error.hint().map(ToString::to_string);
                    fail(&error, hint)
                }
                Err(error) => fail(&error, None),
            }
        }

        Commands::Resources { config } => {
            let config = match load_vm_config(&config) {
                Ok(config) => config,
                Err(error) => return fail(&error, None),
            };
            match print_resources(&config) {
                Ok(()) => Outcome::Success,
                Err(error) => fail(&error, None),
            }
        }

        Commands::Upgrade {
            config,
            version,
            preserve,
            insecure,
            talosconfig,
            endpoint,
        } => {
            let config = match load_vm_config(&config) {
                Ok(config) => config,
                Err(error) => return fail(&error, None),
            };
            let handler = UpgradeCommandHandler::new(TalosctlClient::new());
            let options = UpgradeOptions {
                version,
                preserve,
                insecure,
                talosconfig,
                endpoint,
            };
            match handler.execute(&config, &options) {
                Ok(()) => {
                    println!("Upgrade requested for node '{}'.", config.name);
                    Outcome::Success
                }
                Err(error) => fail(&error, None),
            }
        }
    }
}

/// List the inventory objects a configuration could be placed on
fn print_resources(
    config: &VmConfig,
) -> Result<(), crate::infrastructure::hypervisor::HypervisorError> {
    let connector = GovcConnector::new();
    let hypervisor =
        crate::infrastructure::hypervisor::HypervisorConnector::connect(&connector, &config.vcenter)?;

    let result = (|| {
        let datacenter = hypervisor.find_datacenter(&config.placement.datacenter)?;

        println!("Datastores in '{}':", datacenter.name);
        for datastore in hypervisor.list_datastores(&datacenter)? {
            let capacity_gib = datastore.capacity_bytes / (1024 * 1024 * 1024);
            let free_gib = datastore.free_bytes / (1024 * 1024 * 1024);
            println!(
                "  {:<24} {:>8} GiB total, {:>8} GiB free{}",
                datastore.name,
                capacity_gib,
                free_gib,
                if datastore.accessible {
                    ""
                } else {
                    "  (not accessible)"
                }
            );
        }

        println!("Networks:");
        for network in hypervisor.list_networks(&datacenter)? {
            println!("  {network}");
        }

        println!("Folders:");
        for folder in hypervisor.list_folders(&datacenter)? {
            println!("  {folder}");
        }

        println!("Resource pools:");
        for pool in hypervisor.list_resource_pools(&datacenter)? {
            println!("  {pool}");
        }

        Ok(())
    })();

    hypervisor.disconnect();
    result
}

fn fail(error: &dyn std::error::Error, hint: Option<String>) -> Outcome {
    Outcome::Failed {
        message: error.to_string(),
        hint,
    }
}

/// Wire the production bootstrap dependency graph
fn build_bootstrap_handler(data_dir: &Path) -> BootstrapCommandHandler {
    let defaults = BootstrapDefaults::standard();

    let stats = Arc::new(InstallStatsStore::new(
        data_dir.join("install-stats.json"),
        Arc::new(SystemClock),
    ));
    let watcher = Arc::new(InstallWatcher::new(
        InstallWatchConfig::from_defaults(&defaults),
        stats,
    ));

    let cache_dir = data_dir.join("images");
    let iso_factory: IsoManagerFactory = Arc::new(move |client| {
        Arc::new(DefaultIsoManager::new(client, cache_dir.clone())) as Arc<dyn IsoManager>
    });

    BootstrapCommandHandler::new(
        Arc::new(GovcConnector::new()),
        iso_factory,
        watcher,
        Arc::new(TcpPortProbe::new()),
        defaults,
    )
}

/// Print the success line and emit the bootstrap result file when requested
fn finish_bootstrap(
    handle: &VmHandle,
    config: &VmConfig,
    output: Option<&Path>,
    ssh_key_path: &str,
) -> Outcome {
    println!(
        "VM '{}' ready at {} (SSH {}).",
        handle.name,
        handle.ip_address,
        if handle.ssh_ready { "verified" } else { "unverified" }
    );

    let Some(output) = output else {
        return Outcome::Success;
    };

    // Fingerprint probing is best-effort: a miss omits the optional field.
    let fingerprint = match HostKeyScanner::new().fingerprint(handle.ip_address, DEFAULT_SSH_PORT) {
        Ok(fingerprint) => fingerprint,
        Err(error) => {
            warn!(
                operation = "host_key_probe",
                %error,
                "Could not probe the host key fingerprint"
            );
            None
        }
    };

    let ssh_user = match &config.profile {
        Profile::Ubuntu(ubuntu) => ubuntu.username.clone(),
        Profile::Talos(_) => "talos".to_string(),
    };

    let result = BootstrapResult {
        vm_name: handle.name.to_string(),
        ip: handle.ip_address.to_string(),
        ssh_user,
        ssh_key_path: expand_home(ssh_key_path),
        ssh_port: DEFAULT_SSH_PORT,
        ssh_host_fingerprint: fingerprint,
    };

    match result.save(output) {
        Ok(()) => {
            println!("Bootstrap result written to {}.", output.display());
            Outcome::Success
        }
        Err(error) => fail(&error, None),
    }
}

/// Expand a leading `~/` against `$HOME`
fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest).display().to_string(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_expand_a_home_relative_key_path() {
        if std::env::var_os("HOME").is_some() {
            let expanded = expand_home("~/.ssh/id_ed25519");
            assert!(!expanded.starts_with('~'));
            assert!(expanded.ends_with(".ssh/id_ed25519"));
        }
        assert_eq!(expand_home("/abs/key"), "/abs/key");
    }
}

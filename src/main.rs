//! Binary entry point for vcenter-vm-bootstrap
//!
//! All application logic lives in the library; this shim only starts the
//! runtime and forwards the exit code.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    vcenter_vm_bootstrap_lib::presentation::app::run().await
}

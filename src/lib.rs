//! vCenter VM Bootstrap
//!
//! Provisions virtual machines on a VMware vCenter cluster from declarative
//! configuration and drives them through installation until they are
//! reachable over SSH.
//!
//! ## Architecture Layers
//!
//! - `domain` - validated value types and output contracts
//!   - the VM configuration, defaults table, OS profiles, bootstrap result,
//!     and install-duration statistics
//! - `application` - use case orchestration
//!   - `command_handlers` - bootstrap, delete, recreate, upgrade
//!   - `steps` - the installation-progress watcher
//!   - `provisioners` - Ubuntu autoinstall and Talos OVA variants
//! - `infrastructure` - external tool adapters
//!   - the `govc` hypervisor client, ISO toolchain, cloud-init templating,
//!     reachability probes, and the `talosctl` wrapper
//! - `presentation` - CLI, configuration file loading, output rendering
//!
//! ## Other Modules
//! - `logging` - tracing subscriber configuration
//! - `shared` - command executor and clock, used across layers

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod presentation;
pub mod shared;

//! Domain Layer: validated value types and output contracts
//!
//! Everything here is pure data with invariants: the declarative VM
//! configuration, the defaults table, the OS profile variants, the bootstrap
//! result contract, and the install-duration statistics. No vCenter calls,
//! no subprocesses.

pub mod bootstrap_result;
pub mod defaults;
pub mod install_stats;
pub mod profile;
pub mod vm_config;
pub mod vm_handle;
pub mod vm_name;

pub use bootstrap_result::{BootstrapResult, BootstrapResultError, DEFAULT_SSH_PORT};
pub use defaults::BootstrapDefaults;
pub use install_stats::{profile_key, InstallDurationStats, InstallStatsStore};
pub use profile::{Profile, TalosProfile, UbuntuProfile};
pub use vm_config::{ConfigValidationError, Firmware, VmConfig};
pub use vm_handle::VmHandle;
pub use vm_name::{VmName, VmNameError};

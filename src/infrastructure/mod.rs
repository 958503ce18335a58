//! Infrastructure Layer: external tool adapters
//!
//! Everything that touches the outside world lives here: the `govc`-backed
//! hypervisor client, the ISO toolchain, cloud-init template rendering, TCP
//! and host-key probes, and the `talosctl` wrapper.

pub mod cloud_init;
pub mod hypervisor;
pub mod iso;
pub mod remote;
pub mod talosctl;
pub mod vm_builder;

pub use vm_builder::{VmBuilder, VmBuilderError};

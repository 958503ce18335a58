//! Hypervisor integration
//!
//! The capability surface the bootstrap workflow needs from vCenter, plus the
//! production `govc` CLI adapter.

pub mod client;
pub mod govc;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use client::{HypervisorClient, HypervisorConnector, HypervisorError, ObjectKind};
pub use govc::{GovcClient, GovcConnector};
pub use types::{
    DatacenterRef, DatastoreRef, DatastoreSummary, FolderRef, GuestInfo, NetworkRef, OvaDeployment,
    PowerState, ResourcePoolRef, ToolsStatus, VmCreateSpec, VmRef,
};

//! Remote reachability checks
//!
//! TCP port probing for the post-install verification stage and the SSH host
//! key fingerprint scan used by the bootstrap result.

pub mod host_key;
pub mod ssh_probe;

pub use host_key::{HostKeyError, HostKeyScanner};
pub use ssh_probe::{ReachabilityError, ReachabilityProbe, SshProbePolicy, TcpPortProbe};

//! SSH reachability probe
//!
//! After installation completes, the orchestrator verifies the guest is
//! actually reachable by probing TCP port 22. A plain TCP connect is enough:
//! the goal is "sshd is up and the address is live", not authentication.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::BootstrapDefaults;

/// Retry policy for the reachability probe
#[derive(Debug, Clone)]
pub struct SshProbePolicy {
    pub port: u16,
    pub retries: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
}

impl SshProbePolicy {
    /// Build the policy from the defaults table
    #[must_use]
    pub fn from_defaults(defaults: &BootstrapDefaults) -> Self {
        Self {
            port: 22,
            retries: defaults.ssh_retries,
            retry_delay: defaults.ssh_retry_delay,
            connect_timeout: defaults.ssh_connect_timeout,
        }
    }
}

/// Errors from the reachability probe
#[derive(Debug, Error)]
pub enum ReachabilityError {
    #[error("SSH port {port} on {ip} unreachable after {attempts} attempts")]
    Unreachable {
        ip: Ipv4Addr,
        port: u16,
        attempts: u32,
    },

    #[error("reachability probe cancelled")]
    Cancelled,
}

/// Reachability check the orchestrator runs after post-install
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Wait until the port accepts a TCP connection
    ///
    /// Returns the number of attempts used.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` when every attempt fails, `Cancelled` when the
    /// token fires mid-probe.
    async fn wait_reachable(
        &self,
        cancel: &CancellationToken,
        ip: Ipv4Addr,
        policy: &SshProbePolicy,
    ) -> Result<u32, ReachabilityError>;
}

/// Production probe using plain TCP connects
#[derive(Debug, Default)]
pub struct TcpPortProbe {}

impl TcpPortProbe {
    #[must_use]
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl ReachabilityProbe for TcpPortProbe {
    async fn wait_reachable(
        &self,
        cancel: &CancellationToken,
        ip: Ipv4Addr,
        policy: &SshProbePolicy,
    ) -> Result<u32, ReachabilityError> {
        info!(
            operation = "ssh_probe",
            %ip,
            port = policy.port,
            max_attempts = policy.retries,
            "Probing SSH reachability"
        );

        for attempt in 1..=policy.retries {
            if cancel.is_cancelled() {
                return Err(ReachabilityError::Cancelled);
            }

            let connect = TcpStream::connect((ip, policy.port));
            let result = tokio::select! {
                () = cancel.cancelled() => return Err(ReachabilityError::Cancelled),
                result = tokio::time::timeout(policy.connect_timeout, connect) => result,
            };

            match result {
                Ok(Ok(_stream)) => {
                    info!(
                        operation = "ssh_probe",
                        %ip,
                        port = policy.port,
                        attempt,
                        status = "success",
                        "SSH port reachable"
                    );
                    return Ok(attempt);
                }
                Ok(Err(error)) => {
                    debug!(
                        operation = "ssh_probe",
                        %ip,
                        attempt,
                        %error,
                        "Connect attempt failed"
                    );
                }
                Err(_elapsed) => {
                    debug!(
                        operation = "ssh_probe",
                        %ip,
                        attempt,
                        "Connect attempt timed out"
                    );
                }
            }

            if attempt % 5 == 0 {
                info!(
                    operation = "ssh_probe",
                    %ip,
                    attempt,
                    max_attempts = policy.retries,
                    "Still waiting for SSH reachability"
                );
            }

            if attempt < policy.retries {
                tokio::select! {
                    () = cancel.cancelled() => return Err(ReachabilityError::Cancelled),
                    () = tokio::time::sleep(policy.retry_delay) => {}
                }
            }
        }

        Err(ReachabilityError::Unreachable {
            ip,
            port: policy.port,
            attempts: policy.retries,
        })
    }
}

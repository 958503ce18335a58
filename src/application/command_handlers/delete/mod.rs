//! Delete command handler
//!
//! Resolves the VM by `(datacenter, name)`, powers it off when necessary,
//! and destroys it. Deleting is also the first half of `recreate`, which
//! tolerates an absent VM; the standalone command reports it as an error so
//! a typo does not silently "succeed".

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::domain::VmConfig;
use crate::infrastructure::hypervisor::{
    HypervisorConnector, HypervisorError, PowerState,
};
use crate::infrastructure::{VmBuilder, VmBuilderError};

/// Errors from the delete workflow
#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("required field '{field}' is missing or empty")]
    MissingField { field: &'static str },

    #[error("failed to connect to vCenter: {0}")]
    Connect(#[source] HypervisorError),

    #[error("inventory lookup failed: {0}")]
    Lookup(#[source] HypervisorError),

    #[error("VM '{name}' not found in datacenter '{datacenter}'")]
    NotFound { name: String, datacenter: String },

    #[error("failed to delete VM: {0}")]
    Delete(#[from] VmBuilderError),
}

/// `DeleteCommandHandler` removes a VM created by a bootstrap run
pub struct DeleteCommandHandler {
    connector: Arc<dyn HypervisorConnector>,
}

impl DeleteCommandHandler {
    #[must_use]
    pub fn new(connector: Arc<dyn HypervisorConnector>) -> Self {
        Self { connector }
    }

    /// Delete the configured VM; an absent VM is an error
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the VM does not exist, or the underlying
    /// hypervisor error otherwise.
    #[instrument(
        name = "delete_command",
        skip_all,
        fields(command_type = "delete", vm = %config.name)
    )]
    pub async fn execute(&self, config: &VmConfig) -> Result<(), DeleteError> {
        let deleted = self.delete_if_exists(config).await?;
        if !deleted {
            return Err(DeleteError::NotFound {
                name: config.name.clone(),
                datacenter: config.placement.datacenter.clone(),
            });
        }
        Ok(())
    }

    /// Delete the configured VM when it exists; returns whether it did
    ///
    /// # Errors
    ///
    /// Returns connection, lookup, or destroy errors; an absent VM is
    /// `Ok(false)`.
    pub async fn delete_if_exists(&self, config: &VmConfig) -> Result<bool, DeleteError> {
        for (field, value) in [
            ("name", &config.name),
            ("datacenter", &config.placement.datacenter),
            ("vcenter.host", &config.vcenter.host),
        ] {
            if value.trim().is_empty() {
                return Err(DeleteError::MissingField { field });
            }
        }

        let hypervisor = self
            .connector
            .connect(&config.vcenter)
            .map_err(DeleteError::Connect)?;

        let result = async {
            let datacenter = hypervisor
                .find_datacenter(&config.placement.datacenter)
                .map_err(DeleteError::Lookup)?;

            let Some(vm) = hypervisor
                .find_vm(&datacenter, &config.name)
                .map_err(DeleteError::Lookup)?
            else {
                info!(
                    command = "delete",
                    vm = %config.name,
                    "VM not present, nothing to delete"
                );
                return Ok(false);
            };

            let builder = VmBuilder::new(Arc::clone(&hypervisor));

            let guest = hypervisor.fetch_guest_info(&vm).map_err(DeleteError::Lookup)?;
            if guest.power_state == PowerState::PoweredOn {
                builder.power_off(&vm)?;
            }

            builder.delete(&vm)?;
            info!(
                command = "delete",
                vm = %config.name,
                status = "success",
                "VM deleted"
            );
            Ok(true)
        }
        .await;

        hypervisor.disconnect();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vm_config::fixtures::ubuntu_config;
    use crate::infrastructure::hypervisor::testing::FakeHypervisorClient;
    use crate::infrastructure::hypervisor::HypervisorClient;

    struct FakeConnector {
        client: Arc<FakeHypervisorClient>,
    }

    impl HypervisorConnector for FakeConnector {
        fn connect(
            &self,
            _connection: &crate::domain::vm_config::VcenterConnection,
        ) -> Result<Arc<dyn HypervisorClient>, HypervisorError> {
            Ok(Arc::clone(&self.client) as Arc<dyn HypervisorClient>)
        }
    }

    fn handler(client: &Arc<FakeHypervisorClient>) -> DeleteCommandHandler {
        DeleteCommandHandler::new(Arc::new(FakeConnector {
            client: Arc::clone(client),
        }))
    }

    #[tokio::test]
    async fn it_should_power_off_and_destroy_a_running_vm() {
        let fake = Arc::new(FakeHypervisorClient::new());
        fake.add_existing_vm("test-vm");
        fake.push_guest_info(true, "test-vm");

        handler(&fake).execute(&ubuntu_config()).await.unwrap();

        assert_eq!(fake.count_calls("power_off:test-vm"), 1);
        assert_eq!(fake.count_calls("destroy:test-vm"), 1);
    }

    #[tokio::test]
    async fn it_should_report_an_absent_vm_as_not_found() {
        let fake = Arc::new(FakeHypervisorClient::new());

        let result = handler(&fake).execute(&ubuntu_config()).await;

        assert!(matches!(result, Err(DeleteError::NotFound { .. })));
        assert_eq!(fake.count_calls("destroy"), 0);
    }

    #[tokio::test]
    async fn it_should_treat_an_absent_vm_as_no_op_for_delete_if_exists() {
        let fake = Arc::new(FakeHypervisorClient::new());

        let deleted = handler(&fake)
            .delete_if_exists(&ubuntu_config())
            .await
            .unwrap();

        assert!(!deleted);
    }
}

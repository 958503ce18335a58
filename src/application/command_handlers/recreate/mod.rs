//! Recreate command handler
//!
//! Deletes the VM when it exists, then runs a fresh bootstrap. The delete
//! half tolerates an absent VM so `recreate` doubles as "bootstrap, replacing
//! whatever is there".

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::domain::{VmConfig, VmHandle};

use super::bootstrap::{BootstrapCommandHandler, BootstrapError};
use super::delete::{DeleteCommandHandler, DeleteError};

/// Errors from the recreate workflow
#[derive(Debug, Error)]
pub enum RecreateError {
    #[error("failed to delete the existing VM: {0}")]
    Delete(#[from] DeleteError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// `RecreateCommandHandler` replaces a VM with a freshly bootstrapped one
pub struct RecreateCommandHandler {
    delete: DeleteCommandHandler,
    bootstrap: BootstrapCommandHandler,
}

impl RecreateCommandHandler {
    #[must_use]
    pub fn new(delete: DeleteCommandHandler, bootstrap: BootstrapCommandHandler) -> Self {
        Self { delete, bootstrap }
    }

    /// Delete (when present) and bootstrap the configured VM
    ///
    /// # Errors
    ///
    /// Returns the delete error or the bootstrap error of the failing half.
    #[instrument(
        name = "recreate_command",
        skip_all,
        fields(command_type = "recreate", vm = %config.name)
    )]
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        config: VmConfig,
    ) -> Result<VmHandle, RecreateError> {
        let deleted = self.delete.delete_if_exists(&config).await?;
        if deleted {
            info!(
                command = "recreate",
                vm = %config.name,
                "Existing VM deleted, bootstrapping replacement"
            );
        }

        let handle = self.bootstrap.execute(cancel, config).await?;
        Ok(handle)
    }
}

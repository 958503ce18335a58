//! High-level command handlers
//!
//! One handler per lifecycle operation. Each orchestrates domain types and
//! infrastructure adapters; none render output, that is the presentation
//! layer's job.

pub mod bootstrap;
pub mod delete;
pub mod recreate;
pub mod upgrade;

pub use bootstrap::{BootstrapCommandHandler, BootstrapError};
pub use delete::{DeleteCommandHandler, DeleteError};
pub use recreate::{RecreateCommandHandler, RecreateError};
pub use upgrade::{UpgradeCommandHandler, UpgradeError, UpgradeOptions};

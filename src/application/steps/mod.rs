//! Workflow steps shared by command handlers

pub mod wait_install;

pub use wait_install::{InstallWaitError, InstallWaiter, InstallWatchConfig, InstallWatcher};

//! Application Layer: use case orchestration
//!
//! Command handlers drive the multi-stage workflows; steps are the reusable
//! mid-level units (the install watcher); provisioners carry the per-profile
//! installation mechanics.

pub mod command_handlers;
pub mod provisioners;
pub mod steps;

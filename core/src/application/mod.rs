//! Application layer - Use case services.
//!
//! `DeviceDirectory` keeps the latest device snapshot and the selection;
//! `Coordinator` applies front-end commands to the directory, the device
//! manager and the network service. Both depend on the port traits only.

mod coordinator;
pub(crate) mod directory;

pub use coordinator::{Coordinator, Outcome, Reload};
pub use directory::{DeviceDirectory, EnumerationGuard};

//! Commands accepted by the coordinator.

/// A user intent, independent of any UI toolkit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Select the device with the given identity.
    SelectDevice(String),
    /// Set the port used by the next start. Empty means the default port.
    SetPort(String),
    /// Validate the port and start the network service.
    Start,
    /// Stop the network service.
    Stop,
    /// Enumerate devices again.
    Reload,
}

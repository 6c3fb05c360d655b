//! Device manager port (interface).

use crate::error::Result;

use super::ScanDevicePort;

/// Port for enumerating scanners through the platform backend.
///
/// Implementations own the platform session: it is opened on construction
/// and released by [`close`](DeviceManagerPort::close).
pub trait DeviceManagerPort: Send + Sync {
    /// Device type produced by this backend.
    type Device: ScanDevicePort + 'static;

    /// List the currently attached devices.
    ///
    /// Blocking. Fails once the session has been closed.
    fn enumerate(&self) -> Result<Vec<Self::Device>>;

    /// Release the platform session. Calling it again has no effect.
    fn close(&self);
}

//! Scanner device adapters.
//!
//! Platform-specific implementations of the device manager. Exactly one
//! backend is compiled in:
//! - Unix: SANE, loaded at runtime
//! - Windows: WIA automation objects over COM

#[cfg(unix)]
mod sane;

#[cfg(windows)]
mod wia;

#[cfg(not(any(unix, windows)))]
compile_error!("scanlink supports SANE (unix) and WIA (windows) targets only");

mod session;

use tracing::info;

use crate::error::Result;
use crate::ports::{DeviceManagerPort, ScanDevicePort};

/// The main device manager that uses the platform-specific backend.
///
/// Constructing it opens the platform scanning session.
pub struct DeviceManager {
    #[cfg(unix)]
    inner: sane::SaneManager,

    #[cfg(windows)]
    inner: wia::WiaManager,
}

impl DeviceManager {
    /// Open the platform scanning session.
    ///
    /// Fails with [`Error::Initialization`](crate::Error::Initialization)
    /// when the native backend is unavailable. There is no retry.
    pub fn new() -> Result<Self> {
        let manager = Self {
            #[cfg(unix)]
            inner: sane::SaneManager::new()?,

            #[cfg(windows)]
            inner: wia::WiaManager::new()?,
        };
        info!(backend = Self::backend_name(), "scanner backend ready");
        Ok(manager)
    }

    /// Name of the compiled-in backend.
    pub fn backend_name() -> &'static str {
        if cfg!(windows) {
            "wia"
        } else {
            "sane"
        }
    }
}

impl DeviceManagerPort for DeviceManager {
    type Device = Device;

    fn enumerate(&self) -> Result<Vec<Device>> {
        Ok(self
            .inner
            .enumerate()?
            .into_iter()
            .map(|inner| Device { inner })
            .collect())
    }

    fn close(&self) {
        self.inner.close();
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// A scanner produced by [`DeviceManager`] enumeration.
///
/// A device stays usable after a newer snapshot replaces it; validity is
/// decided by the native session, not by the identity.
pub struct Device {
    #[cfg(unix)]
    inner: sane::SaneDevice,

    #[cfg(windows)]
    inner: wia::WiaDevice,
}

impl ScanDevicePort for Device {
    fn identity(&self) -> &str {
        self.inner.identity()
    }

    fn scan_raw(&self) -> Result<Vec<u8>> {
        self.inner.scan_raw()
    }

    fn scan_pdf(&self) -> Result<Vec<u8>> {
        self.inner.scan_pdf()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("identity", &self.identity())
            .finish()
    }
}

/// Internal trait for platform-specific managers.
trait Backend: Send + Sync {
    type Device: BackendDevice;

    fn enumerate(&self) -> Result<Vec<Self::Device>>;

    fn close(&self);
}

/// Internal trait for platform-specific devices.
trait BackendDevice: Send + Sync {
    fn identity(&self) -> &str;

    fn scan_raw(&self) -> Result<Vec<u8>>;

    fn scan_pdf(&self) -> Result<Vec<u8>>;
}

//! Scanner device port (interface).

use crate::error::Result;

/// Port for one physical scanner.
///
/// Scans block for the physical duration of the acquisition and cannot be
/// cancelled. Async callers must run them on a blocking thread.
pub trait ScanDevicePort: Send + Sync {
    /// Stable identity of the device within its enumeration snapshot.
    fn identity(&self) -> &str;

    /// Acquire one image and return the bytes exactly as the device produced them.
    fn scan_raw(&self) -> Result<Vec<u8>>;

    /// Acquire one image and return it as a single-page A4 PDF.
    fn scan_pdf(&self) -> Result<Vec<u8>>;
}

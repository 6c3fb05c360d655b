//! SANE scanner backend (open/read protocol).
//!
//! The SANE library is loaded at runtime so a missing installation surfaces
//! as an initialization error instead of a link failure. All native calls go
//! through one library-wide lock.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::adapters::imaging::{render_pdf, RawImage};
use crate::domain::{FrameFormat, FrameParameters};
use crate::error::{DeviceStage, Error, Result};

use super::session::{acquire_frame, FrameSession, SessionGate};
use super::{Backend, BackendDevice};

const LIBRARY_NAMES: &[&str] = &[
    "libsane.so.1",
    "libsane.so",
    "libsane.1.dylib",
    "libsane.dylib",
];

type SaneStatus = c_int;
type SaneHandle = *mut c_void;

const STATUS_GOOD: SaneStatus = 0;
const STATUS_EOF: SaneStatus = 5;

const FRAME_GRAY: c_int = 0;
const FRAME_RGB: c_int = 1;
const FRAME_RED: c_int = 2;
const FRAME_GREEN: c_int = 3;
const FRAME_BLUE: c_int = 4;

#[repr(C)]
struct RawDevice {
    name: *const c_char,
    vendor: *const c_char,
    model: *const c_char,
    kind: *const c_char,
}

#[repr(C)]
#[derive(Default)]
struct RawParameters {
    format: c_int,
    last_frame: c_int,
    bytes_per_line: c_int,
    pixels_per_line: c_int,
    lines: c_int,
    depth: c_int,
}

type AuthCallback = Option<unsafe extern "C" fn(*const c_char, *mut c_char, *mut c_char)>;

/// Function table resolved from the shared library.
struct SaneApi {
    init: unsafe extern "C" fn(*mut c_int, AuthCallback) -> SaneStatus,
    exit: unsafe extern "C" fn(),
    get_devices: unsafe extern "C" fn(*mut *const *const RawDevice, c_int) -> SaneStatus,
    open: unsafe extern "C" fn(*const c_char, *mut SaneHandle) -> SaneStatus,
    close: unsafe extern "C" fn(SaneHandle),
    get_parameters: unsafe extern "C" fn(SaneHandle, *mut RawParameters) -> SaneStatus,
    start: unsafe extern "C" fn(SaneHandle) -> SaneStatus,
    read: unsafe extern "C" fn(SaneHandle, *mut u8, c_int, *mut c_int) -> SaneStatus,
    cancel: unsafe extern "C" fn(SaneHandle),
    strstatus: unsafe extern "C" fn(SaneStatus) -> *const c_char,
}

/// A SANE status code with its library description.
#[derive(Error, Debug)]
#[error("{description} (SANE status {code})")]
pub struct SaneError {
    code: SaneStatus,
    description: String,
}

/// Loaded library plus the process-wide session state.
struct SaneLibrary {
    api: SaneApi,
    gate: SessionGate,
    calls: Mutex<()>,
    // Keeps the function pointers above valid.
    _library: Library,
}

impl SaneLibrary {
    fn load() -> Result<Self> {
        let mut last_error = None;
        for name in LIBRARY_NAMES {
            // SAFETY: loading libsane runs its constructors, which have no
            // preconditions.
            match unsafe { Library::new(name) } {
                Ok(library) => return Self::resolve(library),
                Err(e) => last_error = Some(e),
            }
        }
        Err(Error::Initialization {
            message: "SANE library not found".to_string(),
            source: last_error.map(Into::into),
        })
    }

    fn resolve(library: Library) -> Result<Self> {
        let api = SaneApi {
            init: symbol(&library, "sane_init")?,
            exit: symbol(&library, "sane_exit")?,
            get_devices: symbol(&library, "sane_get_devices")?,
            open: symbol(&library, "sane_open")?,
            close: symbol(&library, "sane_close")?,
            get_parameters: symbol(&library, "sane_get_parameters")?,
            start: symbol(&library, "sane_start")?,
            read: symbol(&library, "sane_read")?,
            cancel: symbol(&library, "sane_cancel")?,
            strstatus: symbol(&library, "sane_strstatus")?,
        };

        let mut version: c_int = 0;
        // SAFETY: first call into the library; no authorization callback.
        let status = unsafe { (api.init)(&mut version, None) };
        let library = Self {
            api,
            gate: SessionGate::opened(),
            calls: Mutex::new(()),
            _library: library,
        };
        if status != STATUS_GOOD {
            return Err(Error::initialization(
                "sane_init failed",
                library.status_error(status),
            ));
        }
        info!(
            major = (version >> 24) & 0xff,
            minor = (version >> 16) & 0xff,
            "SANE backend initialized"
        );
        Ok(library)
    }

    fn status_error(&self, code: SaneStatus) -> SaneError {
        // SAFETY: sane_strstatus returns a static string or null.
        let description = unsafe { owned_string((self.api.strstatus)(code)) }
            .unwrap_or_else(|| "unknown status".to_string());
        SaneError { code, description }
    }

    fn check(&self, status: SaneStatus, stage: DeviceStage, message: &str) -> Result<()> {
        if status == STATUS_GOOD {
            return Ok(());
        }
        Err(Error::device(
            stage,
            message,
            Some(self.status_error(status).into()),
        ))
    }

    fn list_devices(&self) -> Result<Vec<String>> {
        let _calls = self.calls.lock();
        if !self.gate.is_open() {
            return Err(Error::enumeration("scanner session is closed", None));
        }

        let mut list: *const *const RawDevice = ptr::null();
        // SAFETY: session is open; the list stays valid until the next call,
        // which the lock prevents while we copy it.
        let status = unsafe { (self.api.get_devices)(&mut list, 0) };
        if status != STATUS_GOOD {
            return Err(Error::enumeration(
                "sane_get_devices failed",
                Some(self.status_error(status).into()),
            ));
        }

        let mut names = Vec::new();
        if list.is_null() {
            return Ok(names);
        }
        // SAFETY: null-terminated array of valid device records.
        unsafe {
            let mut cursor = list;
            while !(*cursor).is_null() {
                let device = &**cursor;
                if let Some(name) = owned_string(device.name) {
                    debug!(
                        name = %name,
                        vendor = %owned_string(device.vendor).unwrap_or_default(),
                        model = %owned_string(device.model).unwrap_or_default(),
                        kind = %owned_string(device.kind).unwrap_or_default(),
                        "found SANE device"
                    );
                    names.push(name);
                }
                cursor = cursor.add(1);
            }
        }
        Ok(names)
    }

    fn close(&self) {
        let _calls = self.calls.lock();
        if self.gate.close() {
            // SAFETY: session was open and no call is in flight.
            unsafe { (self.api.exit)() };
            info!("SANE backend closed");
        }
    }
}

fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T> {
    // SAFETY: the signatures in `SaneApi` match sane/sane.h.
    let symbol = unsafe { library.get::<T>(name.as_bytes()) }
        .map_err(|e| Error::initialization(format!("missing SANE symbol {name}"), e))?;
    Ok(*symbol)
}

/// Copy a C string owned by the library.
///
/// # Safety
/// `text` must be null or point to a valid NUL-terminated string.
unsafe fn owned_string(text: *const c_char) -> Option<String> {
    if text.is_null() {
        return None;
    }
    Some(CStr::from_ptr(text).to_string_lossy().into_owned())
}

/// Open handle on one device; cancelled and closed on drop.
struct SaneSession<'a> {
    library: &'a SaneLibrary,
    handle: SaneHandle,
}

impl<'a> SaneSession<'a> {
    fn open(library: &'a SaneLibrary, name: &str) -> Result<Self> {
        if !library.gate.is_open() {
            return Err(Error::device(
                DeviceStage::Open,
                "scanner session is closed",
                None,
            ));
        }
        let c_name = CString::new(name).map_err(|e| {
            Error::device(DeviceStage::Open, "invalid device name", Some(e.into()))
        })?;

        let mut handle: SaneHandle = ptr::null_mut();
        // SAFETY: valid C string and out pointer.
        let status = unsafe { (library.api.open)(c_name.as_ptr(), &mut handle) };
        library.check(status, DeviceStage::Open, "could not open scanner")?;

        let session = Self { library, handle };
        // SAFETY: handle was just opened.
        let status = unsafe { (library.api.start)(session.handle) };
        library.check(status, DeviceStage::Start, "could not start scan")?;
        Ok(session)
    }
}

impl FrameSession for SaneSession<'_> {
    fn parameters(&mut self) -> Result<FrameParameters> {
        let mut raw = RawParameters::default();
        // SAFETY: open handle and valid out pointer.
        let status = unsafe { (self.library.api.get_parameters)(self.handle, &mut raw) };
        self.library.check(
            status,
            DeviceStage::Parameters,
            "could not read scan parameters",
        )?;
        convert_parameters(&raw)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let max = (buf.len() - filled).min(c_int::MAX as usize) as c_int;
            let mut len: c_int = 0;
            // SAFETY: the destination range lies inside `buf`.
            let status = unsafe {
                (self.library.api.read)(self.handle, buf[filled..].as_mut_ptr(), max, &mut len)
            };
            match status {
                STATUS_GOOD => filled += len.max(0) as usize,
                STATUS_EOF => break,
                other => {
                    return Err(Error::device(
                        DeviceStage::Read,
                        format!("read failed after {filled} bytes"),
                        Some(self.library.status_error(other).into()),
                    ))
                }
            }
        }
        Ok(filled)
    }
}

impl Drop for SaneSession<'_> {
    fn drop(&mut self) {
        // SAFETY: handle is open and closed exactly once here.
        unsafe {
            (self.library.api.cancel)(self.handle);
            (self.library.api.close)(self.handle);
        }
    }
}

fn convert_parameters(raw: &RawParameters) -> Result<FrameParameters> {
    let format = match raw.format {
        FRAME_GRAY => FrameFormat::Gray,
        FRAME_RGB => FrameFormat::Rgb,
        FRAME_RED => FrameFormat::Red,
        FRAME_GREEN => FrameFormat::Green,
        FRAME_BLUE => FrameFormat::Blue,
        other => {
            return Err(Error::device(
                DeviceStage::Parameters,
                format!("unknown frame format {other}"),
                None,
            ))
        }
    };
    if raw.lines < 0 {
        return Err(Error::device(
            DeviceStage::Parameters,
            "device does not report its line count",
            None,
        ));
    }
    if raw.bytes_per_line <= 0 || raw.pixels_per_line <= 0 {
        return Err(Error::device(
            DeviceStage::Parameters,
            format!(
                "invalid line geometry: {} bytes, {} pixels",
                raw.bytes_per_line, raw.pixels_per_line
            ),
            None,
        ));
    }

    Ok(FrameParameters {
        format,
        last_frame: raw.last_frame != 0,
        bytes_per_line: raw.bytes_per_line as usize,
        pixels_per_line: raw.pixels_per_line as usize,
        lines: raw.lines as usize,
        depth: raw.depth.clamp(0, u8::MAX as c_int) as u8,
    })
}

/// SANE device manager.
pub(crate) struct SaneManager {
    library: Arc<SaneLibrary>,
}

impl SaneManager {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            library: Arc::new(SaneLibrary::load()?),
        })
    }
}

impl Backend for SaneManager {
    type Device = SaneDevice;

    fn enumerate(&self) -> Result<Vec<SaneDevice>> {
        let names = self.library.list_devices()?;
        debug!(count = names.len(), "SANE enumeration finished");
        Ok(names
            .into_iter()
            .map(|name| SaneDevice {
                name,
                library: Arc::clone(&self.library),
            })
            .collect())
    }

    fn close(&self) {
        self.library.close();
    }
}

/// One SANE device, addressed by its backend name.
pub(crate) struct SaneDevice {
    name: String,
    library: Arc<SaneLibrary>,
}

impl SaneDevice {
    fn acquire(&self) -> Result<RawImage> {
        let _calls = self.library.calls.lock();
        let mut session = SaneSession::open(&self.library, &self.name)?;
        acquire_frame(&mut session)
    }
}

impl BackendDevice for SaneDevice {
    fn identity(&self) -> &str {
        &self.name
    }

    fn scan_raw(&self) -> Result<Vec<u8>> {
        Ok(self.acquire()?.into_bytes())
    }

    fn scan_pdf(&self) -> Result<Vec<u8>> {
        render_pdf(&self.acquire()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(format: c_int, lines: c_int) -> RawParameters {
        RawParameters {
            format,
            last_frame: 1,
            bytes_per_line: 300,
            pixels_per_line: 100,
            lines,
            depth: 8,
        }
    }

    #[test]
    fn test_convert_rgb_parameters() {
        let params = convert_parameters(&raw(FRAME_RGB, 50)).unwrap();
        assert_eq!(params.format, FrameFormat::Rgb);
        assert_eq!(params.buffer_len(), 15_000);
        assert!(params.last_frame);
    }

    #[test]
    fn test_unknown_line_count_rejected() {
        let err = convert_parameters(&raw(FRAME_GRAY, -1)).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceCommunication {
                stage: DeviceStage::Parameters,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(convert_parameters(&raw(42, 10)).is_err());
    }
}

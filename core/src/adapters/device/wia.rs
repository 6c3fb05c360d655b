//! WIA scanner backend (COM automation objects).
//!
//! Talks to `WIA.DeviceManager` through `IDispatch`, the way a script host
//! would. The manager holds a process-wide MTA usage reference instead of
//! initialising COM on whichever thread created it, so any thread that never
//! called `CoInitializeEx` (the blocking pool, the dropping thread) runs in
//! the implicit MTA. Devices keep only their `DeviceID`; every COM object is
//! created and released inside one [`SharedSession::with`] call.

use std::ptr;
use std::sync::Arc;

use tracing::{debug, info, warn};
use windows::core::{Interface, BSTR, GUID, HSTRING, IUnknown, PCWSTR, VARIANT};
use windows::Win32::System::Com::{
    CLSIDFromProgID, CoCreateInstance, CoDecrementMTAUsage, CoIncrementMTAUsage, IDispatch,
    CLSCTX_ALL, CO_MTA_USAGE_COOKIE, DISPATCH_FLAGS, DISPATCH_METHOD, DISPATCH_PROPERTYGET,
    DISPPARAMS, SAFEARRAY,
};
use windows::Win32::System::Ole::{
    SafeArrayAccessData, SafeArrayGetLBound, SafeArrayGetUBound, SafeArrayUnaccessData,
};
use windows::Win32::System::Variant::{VT_ARRAY, VT_UI1};

use crate::adapters::imaging::{render_pdf, RawImage};
use crate::error::{DeviceStage, Error, Result};

use super::session::SharedSession;
use super::{Backend, BackendDevice};

const PROG_ID: &str = "WIA.DeviceManager";

/// `WiaDeviceType.ScannerDeviceType`.
const SCANNER_DEVICE_TYPE: i32 = 1;

/// `wiaFormatJPEG`.
const FORMAT_JPEG: &str = "{B96B3CAE-0728-11D3-9D7B-0000F81EF32E}";

/// An automation object shared across threads.
struct ComObject(IDispatch);

// SAFETY: every object is created in the multithreaded apartment, where
// interface pointers may be used from any thread of the process.
unsafe impl Send for ComObject {}
unsafe impl Sync for ComObject {}

impl ComObject {
    fn dispid(&self, name: &str) -> windows::core::Result<i32> {
        let wide = HSTRING::from(name);
        let names = [PCWSTR(wide.as_ptr())];
        let mut id = 0;
        // SAFETY: one valid name in, one id out.
        unsafe {
            self.0
                .GetIDsOfNames(&GUID::zeroed(), names.as_ptr(), 1, 0, &mut id)?;
        }
        Ok(id)
    }

    fn invoke(
        &self,
        name: &str,
        flags: DISPATCH_FLAGS,
        args: &[VARIANT],
    ) -> windows::core::Result<VARIANT> {
        let id = self.dispid(name)?;
        // IDispatch takes positional arguments last-first.
        let mut args: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let params = DISPPARAMS {
            rgvarg: args.as_mut_ptr(),
            rgdispidNamedArgs: ptr::null_mut(),
            cArgs: args.len() as u32,
            cNamedArgs: 0,
        };
        let mut result = VARIANT::default();
        // SAFETY: `params` and `result` outlive the call.
        unsafe {
            self.0.Invoke(
                id,
                &GUID::zeroed(),
                0,
                flags,
                &params,
                Some(&mut result),
                None,
                None,
            )?;
        }
        Ok(result)
    }

    fn get(&self, name: &str) -> windows::core::Result<VARIANT> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[])
    }

    fn get_object(&self, name: &str) -> windows::core::Result<ComObject> {
        to_object(&self.get(name)?)
    }

    fn call_object(&self, name: &str, args: &[VARIANT]) -> windows::core::Result<ComObject> {
        to_object(&self.invoke(name, DISPATCH_METHOD, args)?)
    }

    /// `Properties.Item(name).Value` as a string.
    fn property(&self, name: &str) -> windows::core::Result<String> {
        let property = self
            .get_object("Properties")?
            .call_object("Item", &[VARIANT::from(BSTR::from(name))])?;
        Ok(BSTR::try_from(&property.get("Value")?)?.to_string())
    }
}

fn to_object(value: &VARIANT) -> windows::core::Result<ComObject> {
    Ok(ComObject(IUnknown::try_from(value)?.cast::<IDispatch>()?))
}

/// Copy a `VT_ARRAY | VT_UI1` payload out of a variant.
fn to_bytes(value: &VARIANT) -> Result<Vec<u8>> {
    let transfer_error =
        |message: &str| Error::device(DeviceStage::Transfer, message.to_string(), None);

    let raw = value.as_raw();
    // SAFETY: reading the tag and pointer members of a well-formed variant.
    let (vt, array) = unsafe {
        (
            raw.Anonymous.Anonymous.vt,
            raw.Anonymous.Anonymous.Anonymous.parray as *const SAFEARRAY,
        )
    };
    if vt != (VT_ARRAY.0 | VT_UI1.0) || array.is_null() {
        return Err(transfer_error("image data is not a byte array"));
    }

    // SAFETY: one-dimensional byte array owned by `value`, accessed and
    // released within this block.
    unsafe {
        let lower = SafeArrayGetLBound(array, 1)
            .map_err(|e| Error::device(DeviceStage::Transfer, "bad array bounds", Some(e.into())))?;
        let upper = SafeArrayGetUBound(array, 1)
            .map_err(|e| Error::device(DeviceStage::Transfer, "bad array bounds", Some(e.into())))?;
        let len = (upper - lower + 1).max(0) as usize;

        let mut data = ptr::null_mut();
        SafeArrayAccessData(array, &mut data).map_err(|e| {
            Error::device(DeviceStage::Transfer, "could not access image data", Some(e.into()))
        })?;
        let bytes = std::slice::from_raw_parts(data as *const u8, len).to_vec();
        let _ = SafeArrayUnaccessData(array);
        Ok(bytes)
    }
}

/// Keeps the process MTA alive while held.
struct MtaUsage(CO_MTA_USAGE_COOKIE);

// SAFETY: the cookie is an opaque token; `CoDecrementMTAUsage` accepts it
// from any thread.
unsafe impl Send for MtaUsage {}
unsafe impl Sync for MtaUsage {}

impl MtaUsage {
    fn acquire() -> windows::core::Result<Self> {
        // SAFETY: no preconditions; balanced in `drop`.
        unsafe { CoIncrementMTAUsage() }.map(Self)
    }
}

impl Drop for MtaUsage {
    fn drop(&mut self) {
        // SAFETY: the cookie came from `CoIncrementMTAUsage` and is released once.
        if let Err(e) = unsafe { CoDecrementMTAUsage(self.0) } {
            warn!(error = %e, "could not release the COM apartment");
        }
    }
}

/// Everything a WIA session holds. Fields drop in order: the automation
/// object is released while the apartment is still alive.
struct WiaSession {
    manager: ComObject,
    _mta: MtaUsage,
}

/// WIA device manager.
pub(crate) struct WiaManager {
    session: Arc<SharedSession<WiaSession>>,
}

impl WiaManager {
    pub(crate) fn new() -> Result<Self> {
        let mta = MtaUsage::acquire()
            .map_err(|e| Error::initialization("could not initialize COM", e))?;
        let manager = Self::create_manager().map_err(|e| {
            Error::initialization(format!("could not create the {PROG_ID} object"), e)
        })?;

        info!("WIA device manager created");
        Ok(Self {
            session: Arc::new(SharedSession::new(WiaSession { manager, _mta: mta })),
        })
    }

    fn create_manager() -> windows::core::Result<ComObject> {
        let prog_id = HSTRING::from(PROG_ID);
        // SAFETY: the MTA is held by the caller, so this thread is in it.
        unsafe {
            let clsid = CLSIDFromProgID(PCWSTR(prog_id.as_ptr()))?;
            let unknown: IUnknown = CoCreateInstance(&clsid, None, CLSCTX_ALL)?;
            Ok(ComObject(unknown.cast::<IDispatch>()?))
        }
    }

    /// `(name, DeviceID)` of a scanner entry, `None` for other device types.
    fn read_entry(infos: &ComObject, index: i32) -> windows::core::Result<Option<(String, String)>> {
        let info = infos.call_object("Item", &[VARIANT::from(index)])?;
        let kind = i32::try_from(&info.get("Type")?)?;
        if kind != SCANNER_DEVICE_TYPE {
            return Ok(None);
        }
        Ok(Some((info.property("Name")?, info.property("DeviceID")?)))
    }

    fn list(manager: &ComObject) -> Result<Vec<(String, String)>> {
        let enumeration_error =
            |e: windows::core::Error| Error::enumeration("could not list WIA devices", Some(e.into()));
        let infos = manager.get_object("DeviceInfos").map_err(enumeration_error)?;
        let count = infos
            .get("Count")
            .and_then(|count| i32::try_from(&count))
            .map_err(enumeration_error)?;

        let mut entries = Vec::new();
        // WIA collections are 1-based.
        for index in 1..=count {
            match Self::read_entry(&infos, index) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => debug!(index, "skipping non-scanner WIA device"),
                Err(e) => warn!(index, error = %e, "skipping unreadable WIA device"),
            }
        }
        Ok(entries)
    }
}

impl Backend for WiaManager {
    type Device = WiaDevice;

    fn enumerate(&self) -> Result<Vec<WiaDevice>> {
        let entries = self
            .session
            .with(|session| Self::list(&session.manager))
            .unwrap_or_else(|| Err(Error::enumeration("scanner session is closed", None)))?;

        Ok(entries
            .into_iter()
            .map(|(name, id)| WiaDevice {
                name,
                id,
                session: Arc::clone(&self.session),
            })
            .collect())
    }

    fn close(&self) {
        if self.session.close() {
            info!("WIA device manager released");
        }
    }
}

/// One WIA device, addressed by its display name.
pub(crate) struct WiaDevice {
    name: String,
    /// WIA `DeviceID`, looked up again on every scan.
    id: String,
    session: Arc<SharedSession<WiaSession>>,
}

impl WiaDevice {
    fn transfer(&self, manager: &ComObject) -> Result<Vec<u8>> {
        // `DeviceInfos.Item` accepts a DeviceID as well as an index.
        let info = manager
            .get_object("DeviceInfos")
            .and_then(|infos| infos.call_object("Item", &[VARIANT::from(BSTR::from(self.id.as_str()))]))
            .map_err(|e| Error::device(DeviceStage::Open, "scanner is no longer available", Some(e.into())))?;
        let device = info
            .call_object("Connect", &[])
            .map_err(|e| Error::device(DeviceStage::Open, "could not connect to scanner", Some(e.into())))?;
        let item = device
            .get_object("Items")
            .and_then(|items| items.call_object("Item", &[VARIANT::from(1i32)]))
            .map_err(|e| Error::device(DeviceStage::Open, "scanner exposes no item", Some(e.into())))?;
        let file = item
            .call_object("Transfer", &[VARIANT::from(BSTR::from(FORMAT_JPEG))])
            .map_err(|e| Error::device(DeviceStage::Transfer, "scan transfer failed", Some(e.into())))?;
        let data = file
            .get_object("FileData")
            .and_then(|vector| vector.get("BinaryData"))
            .map_err(|e| Error::device(DeviceStage::Read, "could not read image bytes", Some(e.into())))?;

        to_bytes(&data)
    }
}

impl BackendDevice for WiaDevice {
    fn identity(&self) -> &str {
        &self.name
    }

    fn scan_raw(&self) -> Result<Vec<u8>> {
        self.session
            .with(|session| self.transfer(&session.manager))
            .unwrap_or_else(|| {
                Err(Error::device(
                    DeviceStage::Open,
                    "scanner session is closed",
                    None,
                ))
            })
    }

    fn scan_pdf(&self) -> Result<Vec<u8>> {
        render_pdf(&RawImage::Encoded(self.scan_raw()?))
    }
}

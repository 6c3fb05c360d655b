//! Backend-independent pieces of the device adapters.
//!
//! `FrameSession` captures the open/read protocol so the acquisition
//! sequence can be exercised without hardware. `SessionGate` tracks whether
//! the platform session is still open; `SharedSession` owns a platform
//! handle that devices borrow per call.

#![cfg_attr(windows, allow(dead_code))]

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::adapters::imaging::RawImage;
use crate::domain::FrameParameters;
use crate::error::{DeviceStage, Error, Result};

/// An open acquisition against one device.
///
/// Implementations close the underlying handle on drop.
pub(crate) trait FrameSession {
    /// Geometry of the frame about to be read.
    fn parameters(&mut self) -> Result<FrameParameters>;

    /// Blocking read into `buf`. Returns the number of bytes the device
    /// delivered before signalling the end of the frame.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Read one frame: query the geometry, allocate `stride * lines` and keep
/// only the bytes the device actually delivered.
pub(crate) fn acquire_frame<S: FrameSession>(session: &mut S) -> Result<RawImage> {
    let params = session.parameters()?;
    let mut data = vec![0u8; params.buffer_len()];
    let read = session.read(&mut data)?;
    if read == 0 {
        return Err(Error::device(
            DeviceStage::Read,
            "device returned no image data",
            None,
        ));
    }
    data.truncate(read);

    Ok(RawImage::Frame { params, data })
}

/// Open/closed flag for a platform session.
#[derive(Debug)]
pub(crate) struct SessionGate {
    open: AtomicBool,
}

impl SessionGate {
    pub(crate) fn opened() -> Self {
        Self {
            open: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Returns `true` exactly once: for the caller that closes the session.
    pub(crate) fn close(&self) -> bool {
        self.open.swap(false, Ordering::SeqCst)
    }
}

/// A platform handle shared by a manager and the devices it produced.
///
/// Every use borrows the handle for the length of one call. [`close`]
/// waits for those calls to return, then drops the handle exactly once,
/// so nothing derived from it can outlive the session.
///
/// [`close`]: SharedSession::close
#[cfg_attr(unix, allow(dead_code))]
pub(crate) struct SharedSession<H> {
    handle: RwLock<Option<H>>,
}

#[cfg_attr(unix, allow(dead_code))]
impl<H> SharedSession<H> {
    pub(crate) fn new(handle: H) -> Self {
        Self {
            handle: RwLock::new(Some(handle)),
        }
    }

    /// Run `f` against the open handle. `None` once the session is closed.
    pub(crate) fn with<T>(&self, f: impl FnOnce(&H) -> T) -> Option<T> {
        self.handle.read().as_ref().map(f)
    }

    /// Drop the handle. Returns `true` for the call that actually closed it.
    pub(crate) fn close(&self) -> bool {
        let handle = self.handle.write().take();
        handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::adapters::imaging::{render_pdf, testing::embedded_image};
    use crate::domain::FrameFormat;

    /// Session that reports a full frame but delivers only `deliver` bytes.
    struct ShortSession {
        params: FrameParameters,
        deliver: usize,
        closed: std::rc::Rc<std::cell::Cell<bool>>,
    }

    impl FrameSession for ShortSession {
        fn parameters(&mut self) -> Result<FrameParameters> {
            Ok(self.params)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            assert_eq!(buf.len(), self.params.buffer_len());
            let n = self.deliver.min(buf.len());
            buf[..n].copy_from_slice(&pattern(n));
            // Bytes past the delivered range must never be used.
            for byte in &mut buf[n..] {
                *byte = UNDELIVERED;
            }
            Ok(n)
        }
    }

    impl Drop for ShortSession {
        fn drop(&mut self) {
            self.closed.set(true);
        }
    }

    /// Never produced by [`pattern`].
    const UNDELIVERED: u8 = 0xFF;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 200) as u8).collect()
    }

    struct FailingSession {
        stage: DeviceStage,
    }

    impl FrameSession for FailingSession {
        fn parameters(&mut self) -> Result<FrameParameters> {
            if self.stage == DeviceStage::Parameters {
                return Err(Error::device(DeviceStage::Parameters, "io error", None));
            }
            Ok(params(4, 4))
        }

        fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Err(Error::device(DeviceStage::Read, "jammed", None))
        }
    }

    fn params(width: usize, lines: usize) -> FrameParameters {
        FrameParameters {
            format: FrameFormat::Gray,
            last_frame: true,
            bytes_per_line: width,
            pixels_per_line: width,
            lines,
            depth: 8,
        }
    }

    fn short_session(deliver: usize) -> ShortSession {
        ShortSession {
            params: params(32, 40),
            deliver,
            closed: Default::default(),
        }
    }

    #[test]
    fn test_short_read_keeps_only_delivered_bytes() {
        let mut session = short_session(32 * 25);
        let raw = acquire_frame(&mut session).unwrap();
        let bytes = raw.into_bytes();
        assert_eq!(bytes.len(), 32 * 25);
        assert!(!bytes.contains(&UNDELIVERED));
        assert_eq!(bytes, pattern(32 * 25));
    }

    #[test]
    fn test_short_read_pdf_uses_delivered_lines() {
        let mut session = short_session(32 * 25 + 7);
        let raw = acquire_frame(&mut session).unwrap();
        let pdf = render_pdf(&raw).unwrap();
        let (_, width, height) = embedded_image(&pdf);
        assert_eq!((width, height), (32, 25));
    }

    #[test]
    fn test_full_read() {
        let mut session = short_session(usize::MAX);
        let raw = acquire_frame(&mut session).unwrap();
        assert_eq!(raw.into_bytes().len(), 32 * 40);
    }

    #[test]
    fn test_empty_read_is_error() {
        let mut session = short_session(0);
        let err = acquire_frame(&mut session).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceCommunication {
                stage: DeviceStage::Read,
                ..
            }
        ));
    }

    #[test]
    fn test_session_closed_on_error_path() {
        let closed = {
            let mut session = short_session(0);
            let closed = session.closed.clone();
            assert!(acquire_frame(&mut session).is_err());
            closed
        };
        assert!(closed.get());
    }

    #[test]
    fn test_errors_propagate_with_stage() {
        let err = acquire_frame(&mut FailingSession {
            stage: DeviceStage::Parameters,
        })
        .unwrap_err();
        assert!(err.to_string().contains("reading scan parameters"));

        let err = acquire_frame(&mut FailingSession {
            stage: DeviceStage::Read,
        })
        .unwrap_err();
        assert!(err.to_string().contains("jammed"));
    }

    struct CountedHandle(Arc<AtomicUsize>);

    impl Drop for CountedHandle {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn shared_session() -> (Arc<SharedSession<CountedHandle>>, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(SharedSession::new(CountedHandle(Arc::clone(&drops))));
        (session, drops)
    }

    #[test]
    fn test_shared_session_drops_handle_once() {
        let (session, drops) = shared_session();
        assert_eq!(session.with(|_| 7), Some(7));

        assert!(session.close());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(!session.close());
        assert!(session.with(|_| ()).is_none());

        drop(session);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_session_close_waits_for_running_call() {
        let (session, drops) = shared_session();
        let (started_tx, started_rx) = mpsc::channel();

        let user = {
            let session = Arc::clone(&session);
            let drops = Arc::clone(&drops);
            thread::spawn(move || {
                session.with(|_| {
                    started_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(50));
                    drops.load(Ordering::SeqCst)
                })
            })
        };

        started_rx.recv().unwrap();
        assert!(session.close());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        // The handle was still alive for the whole borrowed call.
        assert_eq!(user.join().unwrap(), Some(0));
    }

    #[test]
    fn test_gate_closes_once() {
        let gate = SessionGate::opened();
        assert!(gate.is_open());
        assert!(gate.close());
        assert!(!gate.close());
        assert!(!gate.is_open());
    }
}

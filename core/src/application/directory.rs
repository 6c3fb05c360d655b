//! Device snapshot and selection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::DeviceInfo;
use crate::error::Result;
use crate::ports::{DeviceManagerPort, ScanDevicePort};

/// Holds the latest enumeration snapshot and the selected identity.
///
/// The snapshot is swapped as a whole, so readers see either the previous
/// list or the new one. Devices are reference counted: a scan that started
/// against an older snapshot keeps its device alive until it finishes.
pub struct DeviceDirectory<D> {
    snapshot: RwLock<Arc<Vec<Arc<D>>>>,
    selected: RwLock<Option<String>>,
    enumerating: AtomicBool,
}

impl<D: ScanDevicePort> DeviceDirectory<D> {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
            selected: RwLock::new(None),
            enumerating: AtomicBool::new(false),
        }
    }

    /// Claim the enumeration slot.
    ///
    /// Returns `None` if another enumeration is outstanding. The slot is
    /// released when the guard drops.
    pub fn begin_enumeration(self: &Arc<Self>) -> Option<EnumerationGuard<D>> {
        if self.enumerating.swap(true, Ordering::AcqRel) {
            debug!("enumeration already in flight");
            return None;
        }
        Some(EnumerationGuard {
            directory: Arc::clone(self),
        })
    }

    /// Enumerate on the calling thread and replace the snapshot.
    ///
    /// `Ok(None)` means another enumeration was already running.
    pub fn refresh<M>(self: &Arc<Self>, manager: &M) -> Result<Option<Vec<DeviceInfo>>>
    where
        M: DeviceManagerPort<Device = D>,
    {
        match self.begin_enumeration() {
            Some(guard) => guard.complete(manager.enumerate()).map(Some),
            None => Ok(None),
        }
    }

    /// Whether an enumeration is in flight.
    pub fn is_enumerating(&self) -> bool {
        self.enumerating.load(Ordering::Acquire)
    }

    /// Devices of the current snapshot.
    pub fn devices(&self) -> Arc<Vec<Arc<D>>> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn identities(&self) -> Vec<DeviceInfo> {
        self.devices()
            .iter()
            .map(|device| DeviceInfo::new(device.identity()))
            .collect()
    }

    /// Set or clear the selected identity. The identity is not checked
    /// against the snapshot here; [`selected`](Self::selected) does that.
    pub fn select(&self, identity: Option<String>) {
        *self.selected.write() = identity;
    }

    pub fn selected_identity(&self) -> Option<String> {
        self.selected.read().clone()
    }

    /// The selected device, if it is present in the current snapshot.
    pub fn selected(&self) -> Option<Arc<D>> {
        let identity = self.selected.read().clone()?;
        self.devices()
            .iter()
            .find(|device| device.identity() == identity)
            .cloned()
    }

    fn replace(&self, devices: Vec<D>) -> Vec<DeviceInfo> {
        let devices: Vec<Arc<D>> = devices.into_iter().map(Arc::new).collect();
        let infos: Vec<DeviceInfo> = devices
            .iter()
            .map(|device| DeviceInfo::new(device.identity()))
            .collect();
        *self.snapshot.write() = Arc::new(devices);
        info!(count = infos.len(), "device list updated");
        infos
    }
}

impl<D: ScanDevicePort> Default for DeviceDirectory<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to publish the next snapshot.
pub struct EnumerationGuard<D: ScanDevicePort> {
    directory: Arc<DeviceDirectory<D>>,
}

impl<D: ScanDevicePort> EnumerationGuard<D> {
    /// Publish a successful enumeration. On error the previous snapshot stays.
    pub fn complete(self, result: Result<Vec<D>>) -> Result<Vec<DeviceInfo>> {
        Ok(self.directory.replace(result?))
    }
}

impl<D: ScanDevicePort> Drop for EnumerationGuard<D> {
    fn drop(&mut self) {
        self.directory.enumerating.store(false, Ordering::Release);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MockDevice, MockManager};
    use super::*;

    #[test]
    fn test_refresh_replaces_snapshot() {
        let directory = Arc::new(DeviceDirectory::new());
        let manager = MockManager::new(&["alpha", "beta"]);

        let infos = directory.refresh(&manager).unwrap().unwrap();
        assert_eq!(infos, vec![DeviceInfo::new("alpha"), DeviceInfo::new("beta")]);
        assert_eq!(directory.identities(), infos);
        assert!(!directory.is_enumerating());
    }

    #[test]
    fn test_failed_refresh_keeps_previous_snapshot() {
        let directory = Arc::new(DeviceDirectory::new());
        let manager = MockManager::new(&["alpha"]);
        directory.refresh(&manager).unwrap();

        *manager.fail.lock() = true;
        assert!(directory.refresh(&manager).is_err());
        assert_eq!(directory.identities(), vec![DeviceInfo::new("alpha")]);
        assert!(!directory.is_enumerating());
    }

    #[test]
    fn test_second_enumeration_is_rejected() {
        let directory: Arc<DeviceDirectory<MockDevice>> = Arc::new(DeviceDirectory::new());
        let manager = MockManager::new(&["alpha"]);

        let guard = directory.begin_enumeration().unwrap();
        assert!(directory.begin_enumeration().is_none());
        assert!(directory.refresh(&manager).unwrap().is_none());
        assert_eq!(manager.calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        drop(guard);
        assert!(directory.begin_enumeration().is_some());
    }

    #[test]
    fn test_selected_requires_identity_in_snapshot() {
        let directory = Arc::new(DeviceDirectory::new());
        let manager = MockManager::new(&["alpha"]);
        directory.refresh(&manager).unwrap();

        assert!(directory.selected().is_none());

        directory.select(Some("alpha".to_string()));
        assert_eq!(directory.selected().unwrap().identity(), "alpha");

        directory.select(Some("gone".to_string()));
        assert!(directory.selected().is_none());
        assert_eq!(directory.selected_identity().as_deref(), Some("gone"));
    }

    #[test]
    fn test_stale_device_outlives_snapshot() {
        let directory = Arc::new(DeviceDirectory::new());
        let manager = MockManager::new(&["alpha"]);
        directory.refresh(&manager).unwrap();
        directory.select(Some("alpha".to_string()));
        let device = directory.selected().unwrap();

        *manager.names.lock() = vec!["beta".to_string()];
        directory.refresh(&manager).unwrap();

        assert!(directory.selected().is_none());
        assert!(device.scan_raw().is_ok());
    }
}

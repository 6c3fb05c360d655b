//! Command consumer between a front-end and the scanning core.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ServiceConfig, DEFAULT_PORT};
use crate::domain::{Command, DeviceInfo, Status};
use crate::error::{Error, Result};
use crate::http;
use crate::ports::DeviceManagerPort;
use crate::service::NetworkService;

use super::DeviceDirectory;

/// Outcome of [`Command::Reload`].
#[derive(Debug)]
pub enum Reload {
    /// Enumeration was started on the blocking pool.
    Started(JoinHandle<Result<Vec<DeviceInfo>>>),
    /// An earlier enumeration is still running; nothing was started.
    InFlight,
}

/// Outcome of a handled command.
#[derive(Debug)]
pub enum Outcome {
    Done,
    Reload(Reload),
}

/// Owns the device manager, the device directory and the network service,
/// and applies [`Command`]s to them.
///
/// Methods are meant to be called from one logical thread. Blocking work
/// (enumeration) is moved to the runtime's blocking pool.
pub struct Coordinator<M: DeviceManagerPort + 'static> {
    manager: Arc<M>,
    directory: Arc<DeviceDirectory<M::Device>>,
    service: NetworkService,
    runtime: Handle,
}

impl<M: DeviceManagerPort + 'static> Coordinator<M> {
    /// Wire a coordinator around `manager`, serving the HTTP routes on the
    /// given runtime.
    pub fn new(manager: M, config: ServiceConfig, runtime: Handle) -> Self {
        let directory = Arc::new(DeviceDirectory::new());
        let router = http::router(Arc::clone(&directory));
        let service = NetworkService::new(config, router, runtime.clone());
        Self {
            manager: Arc::new(manager),
            directory,
            service,
            runtime,
        }
    }

    pub fn directory(&self) -> &Arc<DeviceDirectory<M::Device>> {
        &self.directory
    }

    pub fn service(&self) -> &NetworkService {
        &self.service
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Apply one command.
    pub async fn handle(&self, command: Command) -> Result<Outcome> {
        debug!(?command, "handling command");
        match command {
            Command::SelectDevice(identity) => {
                self.ensure_stopped("change the device")?;
                info!(device = %identity, "device selected");
                self.directory.select(Some(identity));
                Ok(Outcome::Done)
            }
            Command::SetPort(port) => {
                let port = if port.trim().is_empty() {
                    DEFAULT_PORT.to_string()
                } else {
                    port.trim().to_string()
                };
                self.service.set_port(port);
                Ok(Outcome::Done)
            }
            Command::Start => {
                self.start().await?;
                Ok(Outcome::Done)
            }
            Command::Stop => {
                self.service.stop().await?;
                Ok(Outcome::Done)
            }
            Command::Reload => Ok(Outcome::Reload(self.reload()?)),
        }
    }

    async fn start(&self) -> Result<()> {
        if self.service.is_running() {
            debug!("start ignored, service already running");
            return Ok(());
        }
        if self.directory.selected().is_none() {
            return Err(Error::NoDeviceSelected);
        }
        self.service.is_valid().await?;
        self.service.start_async();
        Ok(())
    }

    fn reload(&self) -> Result<Reload> {
        self.ensure_stopped("reload devices")?;
        let Some(guard) = self.directory.begin_enumeration() else {
            return Ok(Reload::InFlight);
        };
        self.directory.select(None);

        let manager = Arc::clone(&self.manager);
        let task = self.runtime.spawn_blocking(move || {
            let result = guard.complete(manager.enumerate());
            if let Err(e) = &result {
                warn!(error = %e, "device enumeration failed");
            }
            result
        });
        Ok(Reload::Started(task))
    }

    fn ensure_stopped(&self, action: &str) -> Result<()> {
        if self.service.is_running() {
            return Err(Error::InvalidState(format!(
                "cannot {action} while the service is running"
            )));
        }
        Ok(())
    }

    /// Late bind failure of the most recent start, reported once.
    pub fn take_start_error(&self) -> Option<Error> {
        self.service.get_start_error().take()
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.service.state(),
            port: self.service.port(),
            address: self.service.local_addr().map(|addr| addr.to_string()),
            selected: self.directory.selected_identity(),
            devices: self.directory.identities(),
            enumerating: self.directory.is_enumerating(),
        }
    }

    /// Stop the service and release the platform session.
    pub async fn shutdown(&self) -> Result<()> {
        let stopped = self.service.stop().await;
        self.manager.close();
        stopped
    }
}

//! Subcommand implementations.

pub mod check_port;
pub mod console;
pub mod list;
pub mod scan;
pub mod serve;

use std::time::Duration;

use anyhow::{anyhow, Result};
use scanlink_core::{Coordinator, DeviceManager, DeviceManagerPort, ServiceState};

/// Open the platform scanning session off the async threads.
pub async fn open_manager() -> Result<DeviceManager> {
    Ok(tokio::task::spawn_blocking(DeviceManager::new).await??)
}

/// Wait until a start has either bound or failed.
///
/// A bind failure arrives asynchronously; this turns it into an error.
pub async fn wait_for_start<M: DeviceManagerPort + 'static>(
    coordinator: &Coordinator<M>,
) -> Result<()> {
    loop {
        if let Some(err) = coordinator.take_start_error() {
            return Err(err.into());
        }
        match coordinator.service().state() {
            ServiceState::Running => return Ok(()),
            ServiceState::Starting => tokio::time::sleep(Duration::from_millis(20)).await,
            state => {
                return Err(match coordinator.take_start_error() {
                    Some(err) => err.into(),
                    None => anyhow!("service is {state}"),
                })
            }
        }
    }
}

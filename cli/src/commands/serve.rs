//! Serve command - run the scan endpoint until Ctrl-C.

use anyhow::{Context, Result};
use scanlink_core::{Command, Coordinator, Outcome, Reload, ServiceConfig};
use tokio::runtime::Handle;
use tracing::info;

pub async fn run(device: String, port: String) -> Result<()> {
    let manager = super::open_manager().await?;
    let coordinator = Coordinator::new(manager, ServiceConfig::default(), Handle::current());

    if let Outcome::Reload(Reload::Started(task)) = coordinator.handle(Command::Reload).await? {
        let devices = task.await??;
        info!(count = devices.len(), "scanners found");
    }
    coordinator
        .handle(Command::SelectDevice(device.clone()))
        .await?;
    coordinator.handle(Command::SetPort(port)).await?;
    coordinator
        .handle(Command::Start)
        .await
        .with_context(|| format!("cannot serve '{device}'"))?;
    super::wait_for_start(&coordinator).await?;

    if let Some(addr) = coordinator.service().local_addr() {
        println!("Serving '{device}' on http://{addr} (Ctrl-C to stop)");
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    coordinator.shutdown().await?;
    coordinator.service().wait_stopped().await;
    Ok(())
}

//! List command - show attached scanners.

use anyhow::Result;
use scanlink_core::{DeviceInfo, DeviceManagerPort, ScanDevicePort};

pub async fn run(json: bool) -> Result<()> {
    let manager = super::open_manager().await?;
    let devices: Vec<DeviceInfo> = tokio::task::spawn_blocking(move || {
        manager.enumerate().map(|devices| {
            devices
                .iter()
                .map(|device| DeviceInfo::new(device.identity()))
                .collect()
        })
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No scanners found.");
        return Ok(());
    }

    println!("DEVICE");
    println!("{}", "-".repeat(40));
    for device in &devices {
        println!("{device}");
    }

    println!("\nTotal: {} scanners", devices.len());
    Ok(())
}

//! Scan command - one page to a file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use scanlink_core::{DeviceManagerPort, Error, ScanDevicePort};
use serde::Serialize;

#[derive(Serialize)]
struct ScanReport<'a> {
    device: &'a str,
    path: &'a Path,
    bytes: usize,
}

pub async fn run(device: String, raw: bool, output: Option<PathBuf>, json: bool) -> Result<()> {
    let manager = super::open_manager().await?;
    let identity = device.clone();
    let data = tokio::task::spawn_blocking(move || {
        let device = manager
            .enumerate()?
            .into_iter()
            .find(|candidate| candidate.identity() == identity)
            .ok_or(Error::NoDeviceSelected)?;
        if raw {
            device.scan_raw()
        } else {
            device.scan_pdf()
        }
    })
    .await?
    .with_context(|| format!("scan with '{device}' failed"))?;

    let path = output.unwrap_or_else(|| default_output(raw));
    save(&path, &data).await?;

    let report = ScanReport {
        device: &device,
        path: &path,
        bytes: data.len(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Wrote {} bytes to {}", report.bytes, path.display());
    }
    Ok(())
}

async fn save(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("could not write {}", path.display()))
}

fn default_output(raw: bool) -> PathBuf {
    let extension = if raw { "bin" } else { "pdf" };
    PathBuf::from(format!(
        "scan-{}.{extension}",
        Local::now().format("%Y%m%d-%H%M%S")
    ))
}

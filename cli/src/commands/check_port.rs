//! Check-port command - validate a port before serving on it.

use std::sync::Arc;

use anyhow::Result;
use scanlink_core::{http, Device, DeviceDirectory, NetworkService, ServiceConfig};
use serde_json::json;
use tokio::runtime::Handle;

pub async fn run(port: String, json: bool) -> Result<()> {
    let directory: Arc<DeviceDirectory<Device>> = Arc::new(DeviceDirectory::new());
    let service = NetworkService::new(
        ServiceConfig::with_port(port.clone()),
        http::router(directory),
        Handle::current(),
    );
    let result = service.is_valid().await;

    if json {
        let report = match &result {
            Ok(()) => json!({ "port": port, "valid": true }),
            Err(e) => json!({ "port": port, "valid": false, "error": e.to_string() }),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if result.is_ok() {
        println!("Port {port} is available.");
    }

    Ok(result?)
}

//! Network service state model.

use serde::Serialize;

use super::DeviceInfo;

/// Run state of the network service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Stopped,
    /// The listener bind is in flight.
    Starting,
    Running,
    /// The listener bind failed; the state resets to `Stopped` right after.
    Failed,
}

impl ServiceState {
    /// Whether the service counts as running (a bind may still be in flight).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of the coordinator, for display.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: ServiceState,
    pub port: String,
    pub address: Option<String>,
    pub selected: Option<String>,
    pub devices: Vec<DeviceInfo>,
    pub enumerating: bool,
}

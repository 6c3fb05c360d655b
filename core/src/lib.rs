//! scanlink core library
//!
//! Exposes a locally attached scanner as an HTTP endpoint.
//! Provides functionality to:
//! - Enumerate scanners through the platform scanning backend
//! - Acquire an image and compose it into a single-page A4 PDF
//! - Run a start/stop-able HTTP listener on a configurable port
//! - Apply front-end commands through a coordinator
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: Platform scanning backends and image encoding
//! - `application`: Device directory and command coordinator
//! - `service`: Network service lifecycle
//!
//! # Platform Support
//! - Unix (Linux, macOS, BSD): SANE, loaded at runtime
//! - Windows: WIA automation objects over COM

// Hexagonal architecture layers
pub mod domain;
pub mod ports;
pub mod adapters;
pub mod application;

pub mod config;
pub mod error;
pub mod http;
pub mod service;

// Re-export domain types (primary API)
pub use domain::{Command, DeviceInfo, ServiceState, Status};

// Re-export other commonly used types
pub use adapters::{Device, DeviceManager};
pub use application::{Coordinator, DeviceDirectory, Outcome, Reload};
pub use config::{ServiceConfig, DEFAULT_PORT};
pub use error::{Error, PortConfigError, Result};
pub use ports::{DeviceManagerPort, ScanDevicePort};
pub use service::{NetworkService, StartError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

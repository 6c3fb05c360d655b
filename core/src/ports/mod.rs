//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the application layer uses
//! to interact with scanners. Implementations live in `adapters`.

mod device;
mod manager;

pub use device::ScanDevicePort;
pub use manager::DeviceManagerPort;

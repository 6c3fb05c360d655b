//! Domain layer - Pure data models.
//!
//! This module contains the types that describe devices, scan frames and the
//! network service state. These types have no I/O dependencies and can be
//! tested in isolation.

mod command;
mod device;
mod frame;
mod state;

// Re-export all domain types
pub use command::Command;
pub use device::DeviceInfo;
pub use frame::{FrameFormat, FrameParameters};
pub use state::{ServiceState, Status};

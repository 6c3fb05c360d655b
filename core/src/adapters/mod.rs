//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`.
//! Each adapter handles communication with external systems.

pub mod device;
pub mod imaging;

// Re-export main types for convenience
pub use device::{Device, DeviceManager};
pub use imaging::{render_pdf, RawImage};

//! Inference plumbing shared by the detection and species stages.

pub mod cuda_detection;
pub mod device;
mod library_detection;
pub mod session;

pub use device::{Device, DeviceHint, PlatformProbe, select_device, select_device_with};
pub use session::build_session;

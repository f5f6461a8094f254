//! Frame handling, instance masks and classifier crops.

pub mod crop;
mod frame;
pub mod mask;

pub use crop::{CropSpec, extract_crop};
pub use frame::{ChannelOrder, Frame, swap_red_blue};
pub use mask::{InstanceMask, largest_polygon};

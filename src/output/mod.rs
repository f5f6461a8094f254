//! Result output and progress reporting for the CLI.

pub mod json;
pub mod progress;

pub use json::{FrameRecord, write_record};

//! Image input handling for batch detection runs.

mod input;

pub use input::{collect_input_images, is_image_file, load_frame};

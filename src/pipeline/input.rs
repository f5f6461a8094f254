//! Input image discovery and decoding.

use crate::constants::IMAGE_EXTENSIONS;
use crate::error::{Error, Result};
use crate::vision::{ChannelOrder, Frame};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Collect image files from paths (files or directories).
///
/// Directories are scanned recursively. The result is sorted so runs are
/// reproducible.
pub fn collect_input_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_image_file(path) {
                files.push(path.clone());
            } else {
                warn!("Skipping non-image file: {}", path.display());
            }
        } else if path.is_dir() {
            collect_images_recursive(path, &mut files)?;
        } else {
            warn!("Skipping non-existent path: {}", path.display());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn collect_images_recursive(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_images_recursive(&path, files)?;
        } else if is_image_file(&path) {
            files.push(path);
        }
    }

    Ok(())
}

/// Check if a file has a supported image extension.
pub fn is_image_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|wanted| ext.eq_ignore_ascii_case(wanted))
    })
}

/// Decode `path` into an RGB frame stamped with the file's modification time.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .map_err(|e| Error::ImageDecode {
            path: path.to_path_buf(),
            source: e,
        })?
        .to_rgb8();

    let frame = Frame::new(image, ChannelOrder::Rgb);
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    Ok(match modified {
        Some(time) => {
            let time: DateTime<Utc> = time.into();
            frame.with_timestamp(time.timestamp_micros() as f64 / 1_000_000.0)
        }
        None => frame,
    })
}

//! Decoded camera frames.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Byte order of the three colour channels in a pixel buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// Red, green, blue.
    #[default]
    Rgb,
    /// Blue, green, red (OpenCV and most camera SDKs).
    Bgr,
}

/// A decoded frame handed over by the capture side.
///
/// The buffer is stored in an [`RgbImage`] for its packed three-channel
/// layout; `order` says what the channels actually hold.
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: RgbImage,
    order: ChannelOrder,
    timestamp: f64,
}

impl Frame {
    /// Wrap a pixel buffer captured now.
    pub fn new(pixels: RgbImage, order: ChannelOrder) -> Self {
        Self {
            pixels,
            order,
            timestamp: now_timestamp(),
        }
    }

    /// Wrap raw packed bytes. Returns `None` if the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>, order: ChannelOrder) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|pixels| Self::new(pixels, order))
    }

    /// Override the capture timestamp (seconds since the Unix epoch).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// True when the frame has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// The raw pixel buffer in `order()` channel order.
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Channel order of the buffer.
    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Capture time in seconds since the Unix epoch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// The frame as true RGB, copying only when the buffer is BGR.
    pub fn to_rgb(&self) -> Cow<'_, RgbImage> {
        match self.order {
            ChannelOrder::Rgb => Cow::Borrowed(&self.pixels),
            ChannelOrder::Bgr => {
                let mut rgb = self.pixels.clone();
                swap_red_blue(&mut rgb);
                Cow::Owned(rgb)
            }
        }
    }
}

/// Swap the first and third channel of every pixel in place.
pub fn swap_red_blue(image: &mut RgbImage) {
    for pixel in image.pixels_mut() {
        pixel.0.swap(0, 2);
    }
}

fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

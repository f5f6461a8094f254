//! Classifier crops built from detection boxes and instance polygons.

use super::{ChannelOrder, Frame, swap_red_blue};
use crate::detector::BoundingBox;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use tracing::debug;

/// What the classifier expects from a crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSpec {
    /// Output size as `(width, height)`.
    pub input_size: (u32, u32),
    /// Channel order of the output.
    pub channel_order: ChannelOrder,
}

/// Cut `bbox` out of `frame`, suppress the background outside `polygon`,
/// convert channel order and resize to `spec.input_size`.
///
/// `polygon` is in frame coordinates. Polygons with fewer than three
/// distinct points are ignored and the plain box crop is used. Returns
/// `None` when the box has no area inside the frame.
pub fn extract_crop(
    frame: &Frame,
    bbox: &BoundingBox,
    polygon: Option<&[(i32, i32)]>,
    spec: &CropSpec,
) -> Option<RgbImage> {
    let (out_w, out_h) = spec.input_size;
    if out_w == 0 || out_h == 0 {
        return None;
    }

    let bbox = bbox.clamped(frame.width(), frame.height())?;
    let (x, y) = (bbox.x1.unsigned_abs(), bbox.y1.unsigned_abs());
    let (w, h) = (bbox.width().unsigned_abs(), bbox.height().unsigned_abs());
    let mut crop = imageops::crop_imm(frame.pixels(), x, y, w, h).to_image();

    if let Some(points) = polygon {
        suppress_background(&mut crop, points, (bbox.x1, bbox.y1));
    }

    if frame.order() != spec.channel_order {
        swap_red_blue(&mut crop);
    }

    if (w, h) == (out_w, out_h) {
        return Some(crop);
    }
    Some(imageops::resize(&crop, out_w, out_h, FilterType::Triangle))
}

/// Zero every pixel of `crop` outside the polygon.
fn suppress_background(crop: &mut RgbImage, points: &[(i32, i32)], origin: (i32, i32)) {
    let local = local_outline(points, origin);
    if local.len() < 3 {
        debug!("Polygon has {} distinct point(s), using box crop", local.len());
        return;
    }

    let mut fill = GrayImage::new(crop.width(), crop.height());
    draw_polygon_mut(&mut fill, &local, Luma([255]));

    for (pixel, keep) in crop.pixels_mut().zip(fill.pixels()) {
        if keep.0[0] == 0 {
            *pixel = Rgb([0, 0, 0]);
        }
    }
}

/// Translate to crop-local coordinates, dropping repeated points and the
/// closing duplicate so the outline is open.
fn local_outline(points: &[(i32, i32)], (ox, oy): (i32, i32)) -> Vec<Point<i32>> {
    let mut local: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for &(px, py) in points {
        let point = Point::new(px - ox, py - oy);
        if local.last() != Some(&point) {
            local.push(point);
        }
    }
    while local.len() > 1 && local.first() == local.last() {
        local.pop();
    }
    local
}

//! Instance masks and their boundary polygons.

use crate::constants::segmentation::POLYGON_EPSILON;
use image::{GrayImage, imageops};
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;

/// Binary mask of one instance, local to its bounding box.
///
/// Non-zero pixels are foreground. `origin` is the frame coordinate of the
/// mask's top-left pixel.
#[derive(Debug, Clone)]
pub struct InstanceMask {
    /// Frame coordinate of pixel `(0, 0)` of `mask`.
    pub origin: (i32, i32),
    /// Foreground mask.
    pub mask: GrayImage,
}

impl InstanceMask {
    /// Number of foreground pixels.
    pub fn foreground_pixels(&self) -> usize {
        self.mask.pixels().filter(|p| p.0[0] > 0).count()
    }
}

/// Boundary of the largest connected component of `mask`, in frame coordinates.
///
/// Only outer borders are considered; holes never win. The contour is
/// simplified with Douglas-Peucker. Returns `None` for an empty mask.
pub fn largest_polygon(mask: &InstanceMask) -> Option<Vec<(i32, i32)>> {
    // Contour tracing ignores components touching the image border; masks
    // are cropped tight to their box, so trace on a one-pixel frame.
    let (width, height) = mask.mask.dimensions();
    let mut padded = GrayImage::new(width + 2, height + 2);
    imageops::replace(&mut padded, &mask.mask, 1, 1);
    let contours = find_contours::<i32>(&padded);

    let largest = contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && !c.points.is_empty())
        .max_by(|a, b| {
            let (area_a, area_b) = (shoelace_area(&a.points), shoelace_area(&b.points));
            area_a
                .total_cmp(&area_b)
                .then_with(|| a.points.len().cmp(&b.points.len()))
        })?;

    let simplified = approximate_polygon_dp(&largest.points, POLYGON_EPSILON, true);
    let points = if simplified.len() >= 3 {
        simplified
    } else {
        largest.points
    };

    let (ox, oy) = (mask.origin.0 - 1, mask.origin.1 - 1);
    Some(points.iter().map(|p| (p.x + ox, p.y + oy)).collect())
}

/// Unsigned polygon area.
fn shoelace_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    (twice.abs() as f64) / 2.0
}

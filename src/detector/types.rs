//! Detection records handed to downstream consumers.

use crate::species::SpeciesCandidate;
use serde::Serialize;

/// Axis-aligned box in frame pixel coordinates, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x1: i32,
    /// Top edge.
    pub y1: i32,
    /// Right edge.
    pub x2: i32,
    /// Bottom edge.
    pub y2: i32,
}

impl BoundingBox {
    /// Create a box from corner coordinates.
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Round float `[x1, y1, x2, y2]` and clamp to a `width` x `height` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clamp_from_f32(xyxy: [f32; 4], width: u32, height: u32) -> Option<Self> {
        if xyxy.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let [x1, y1, x2, y2] = xyxy.map(|v| v.round().clamp(i32::MIN as f32, i32::MAX as f32) as i32);
        Self::new(x1, y1, x2, y2).clamped(width, height)
    }

    /// This box clamped to a `width` x `height` frame, or `None` if empty.
    pub fn clamped(&self, width: u32, height: u32) -> Option<Self> {
        let max_x = i32::try_from(width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height).unwrap_or(i32::MAX);

        let clamped = Self {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        };
        (clamped.x2 > clamped.x1 && clamped.y2 > clamped.y1).then_some(clamped)
    }

    /// Box width in pixels.
    pub const fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    /// Box height in pixels.
    pub const fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    /// Integer centre point.
    pub const fn center(&self) -> (i32, i32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    /// Area in square pixels.
    pub fn area(&self) -> i64 {
        i64::from(self.width()) * i64::from(self.height())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct SpeciesLabel {
    #[serde(rename = "species")]
    name: String,
    #[serde(rename = "species_confidence")]
    confidence: f32,
}

/// One located target-class instance in one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    bbox: BoundingBox,
    confidence: f32,
    class_id: usize,
    class_name: String,
    center: (i32, i32),
    area: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    polygon: Option<Vec<(i32, i32)>>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    species: Option<SpeciesLabel>,
    timestamp: f64,
}

impl Detection {
    pub(crate) fn new(
        bbox: BoundingBox,
        confidence: f32,
        class_id: usize,
        class_name: String,
        polygon: Option<Vec<(i32, i32)>>,
        timestamp: f64,
    ) -> Self {
        Self {
            center: bbox.center(),
            area: bbox.area(),
            bbox,
            confidence,
            class_id,
            class_name,
            polygon,
            species: None,
            timestamp,
        }
    }

    pub(crate) fn set_species(&mut self, name: String, confidence: f32) {
        self.species = Some(SpeciesLabel { name, confidence });
    }

    /// Bounding box, clamped to the frame.
    pub const fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Detection-stage confidence.
    pub const fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Raw detector class id.
    pub const fn class_id(&self) -> usize {
        self.class_id
    }

    /// Raw detector class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Centre of the bounding box.
    pub const fn center(&self) -> (i32, i32) {
        self.center
    }

    /// Area of the bounding box.
    pub const fn area(&self) -> i64 {
        self.area
    }

    /// Instance boundary in frame coordinates, if a mask was produced.
    pub fn polygon(&self) -> Option<&[(i32, i32)]> {
        self.polygon.as_deref()
    }

    /// Resolved species name.
    pub fn species(&self) -> Option<&str> {
        self.species.as_ref().map(|s| s.name.as_str())
    }

    /// Confidence of the resolved species, set iff `species()` is.
    pub fn species_confidence(&self) -> Option<f32> {
        self.species.as_ref().map(|s| s.confidence)
    }

    /// Capture time of the frame.
    pub const fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Detections of one frame together with the ranked species candidates
/// computed for each of them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameAnalysis {
    /// Detections in model output order.
    pub detections: Vec<Detection>,
    /// Ranked candidates per detection, same order; empty when the crop was
    /// not classified.
    pub candidates: Vec<Vec<SpeciesCandidate>>,
}

impl FrameAnalysis {
    /// Ranked candidates for detection `index`.
    pub fn candidates_for(&self, index: usize) -> &[SpeciesCandidate] {
        self.candidates.get(index).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_from_f32_clamps_to_frame() {
        let bbox = BoundingBox::clamp_from_f32([-12.4, 5.6, 700.0, 90.2], 640, 480).unwrap();
        assert_eq!(bbox, BoundingBox::new(0, 6, 640, 90));
    }

    #[test]
    fn test_clamp_rejects_empty_and_outside_boxes() {
        let cases = [
            [10.0, 10.0, 10.0, 50.0],
            [700.0, 10.0, 800.0, 50.0],
            [10.0, -50.0, 50.0, -1.0],
            [f32::NAN, 0.0, 10.0, 10.0],
            [50.0, 50.0, 10.0, 10.0],
        ];
        for xyxy in cases {
            assert!(BoundingBox::clamp_from_f32(xyxy, 640, 480).is_none(), "{xyxy:?}");
        }
    }

    #[test]
    fn test_center_and_area() {
        let bbox = BoundingBox::new(10, 20, 30, 60);
        assert_eq!(bbox.center(), (20, 40));
        assert_eq!(bbox.area(), 800);
    }

    #[test]
    fn test_detection_derives_geometry() {
        let det = Detection::new(BoundingBox::new(0, 0, 4, 2), 0.8, 14, "bird".into(), None, 1.0);
        assert_eq!(det.center(), (2, 1));
        assert_eq!(det.area(), 8);
        assert!(det.species().is_none());
        assert!(det.species_confidence().is_none());
    }

    #[test]
    fn test_detection_json_flattens_species() {
        let mut det = Detection::new(BoundingBox::new(0, 0, 4, 2), 0.8, 14, "bird".into(), None, 1.0);
        let json = serde_json::to_value(&det).unwrap();
        assert!(json.get("species").is_none());
        assert!(json.get("polygon").is_none());

        det.set_species("Red-tailed Hawk".into(), 0.5);
        let json = serde_json::to_value(&det).unwrap();
        assert_eq!(json["species"], "Red-tailed Hawk");
        assert_eq!(json["species_confidence"], 0.5);
        assert_eq!(json["bbox"]["x2"], 4);
    }
}

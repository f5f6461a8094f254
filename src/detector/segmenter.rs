//! YOLOv8-seg style instance segmentation on ONNX Runtime.
//!
//! The model takes a letterboxed `[1, 3, S, S]` RGB input (image scaled to
//! fit at the top-left, padding filled with grey) and returns
//! - `output0`: `[1, 4 + nc + nm, anchors]` boxes (cx, cy, w, h), class
//!   scores and mask coefficients;
//! - `output1`: `[1, nm, mh, mw]` mask prototypes (absent for plain
//!   detection models).

use super::BoundingBox;
use crate::constants::segmentation::{LETTERBOX_FILL, MASK_THRESHOLD, NAMES_METADATA_KEY};
use crate::error::{Error, Result};
use crate::inference::session::custom_metadata;
use crate::inference::{Device, build_session};
use crate::labels::dense_class_names;
use crate::vision::{Frame, InstanceMask};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use ndarray::{Array2, Array4, ArrayView2, ArrayView3};
use ort::session::Session;
use ort::value::Tensor;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

/// One instance as reported by a segmentation model, before filtering.
#[derive(Debug, Clone)]
pub struct RawInstance {
    /// Box as `[x1, y1, x2, y2]` in frame pixels, not yet clamped.
    pub bbox: [f32; 4],
    /// Detection confidence.
    pub confidence: f32,
    /// Model class index.
    pub class_id: usize,
    /// Instance mask, when the model produces masks.
    pub mask: Option<InstanceMask>,
}

/// A loaded instance segmentation model.
pub trait SegmentationModel: Send {
    /// Class names by class index, when the model carries them.
    fn class_names(&self) -> Option<&[String]>;

    /// Run one frame with the given score and overlap-suppression thresholds.
    fn infer(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<RawInstance>>;
}

/// Parse the class dictionary Ultralytics exporters store in model
/// metadata, e.g. `{0: 'person', 1: 'bicycle'}`.
pub fn parse_class_names(metadata: &str) -> Option<Vec<String>> {
    let pattern = Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#).ok()?;
    let entries: Vec<(usize, String)> = pattern
        .captures_iter(metadata)
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].to_string())))
        .collect();

    let names = dense_class_names(entries);
    (!names.is_empty()).then_some(names)
}

/// How the frame was mapped into the model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    frame_width: u32,
    frame_height: u32,
    input_size: u32,
    /// Input pixels per frame pixel.
    ratio: f32,
}

impl Letterbox {
    fn new(frame_width: u32, frame_height: u32, input_size: u32) -> Self {
        let ratio = (input_size as f32 / frame_width as f32).min(input_size as f32 / frame_height as f32);
        Self {
            frame_width,
            frame_height,
            input_size,
            ratio,
        }
    }

    fn scaled_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.ratio).round() as u32).clamp(1, self.input_size);
        (scale(self.frame_width), scale(self.frame_height))
    }
}

/// ONNX Runtime implementation of [`SegmentationModel`].
pub struct OnnxSegmenter {
    session: Session,
    input_size: u32,
    class_names: Option<Vec<String>>,
}

impl OnnxSegmenter {
    /// Load `path` on `device` with a square input of `input_size` pixels.
    pub fn load(path: &Path, device: Device, input_size: u32) -> Result<Self> {
        let session = build_session(path, device)?;
        let class_names =
            custom_metadata(&session, NAMES_METADATA_KEY).and_then(|raw| parse_class_names(&raw));

        match &class_names {
            Some(names) => info!("Segmentation model exposes {} class name(s)", names.len()),
            None => info!("Segmentation model has no class names, using COCO ids"),
        }

        Ok(Self {
            session,
            input_size,
            class_names,
        })
    }

    fn preprocess(&self, frame: &Frame, letterbox: &Letterbox) -> Vec<f32> {
        let size = self.input_size as usize;
        let (width, height) = letterbox.scaled_size();
        let rgb = frame.to_rgb();
        let resized = imageops::resize(&*rgb, width, height, FilterType::Triangle);

        let mut input = Array4::from_elem((1, 3, size, size), LETTERBOX_FILL);
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                input[[0, c, y, x]] = f32::from(pixel.0[c]) / 255.0;
            }
        }
        input.into_raw_vec_and_offset().0
    }
}

fn inference_error(e: impl std::fmt::Display) -> Error {
    Error::Inference {
        reason: e.to_string(),
    }
}

fn dims(shape: &[i64]) -> Vec<usize> {
    shape.iter().map(|&d| usize::try_from(d).unwrap_or(0)).collect()
}

impl SegmentationModel for OnnxSegmenter {
    fn class_names(&self) -> Option<&[String]> {
        self.class_names.as_deref()
    }

    fn infer(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> Result<Vec<RawInstance>> {
        let letterbox = Letterbox::new(frame.width(), frame.height(), self.input_size);
        let size = self.input_size as usize;
        let data = self.preprocess(frame, &letterbox);
        let tensor =
            Tensor::from_array(([1usize, 3, size, size], data.into_boxed_slice())).map_err(inference_error)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(inference_error)?;

        let mut tensors = Vec::new();
        for (_, value) in outputs.iter() {
            let (shape, values) = value.try_extract_tensor::<f32>().map_err(inference_error)?;
            tensors.push((dims(shape), values.to_vec()));
        }
        drop(outputs);

        let (pred_shape, preds) = tensors.first().ok_or_else(|| Error::OutputShape {
            reason: "model produced no outputs".to_string(),
        })?;
        let [1, features, anchors] = pred_shape[..] else {
            return Err(Error::OutputShape {
                reason: format!("expected [1, features, anchors], got {pred_shape:?}"),
            });
        };
        let preds = ArrayView2::from_shape((features, anchors), preds)?;

        let protos = match tensors.get(1) {
            Some((shape, values)) => {
                let [1, nm, mh, mw] = shape[..] else {
                    return Err(Error::OutputShape {
                        reason: format!("expected [1, nm, mh, mw] prototypes, got {shape:?}"),
                    });
                };
                Some(ArrayView3::from_shape((nm, mh, mw), values.as_slice())?)
            }
            None => None,
        };

        decode(
            preds,
            protos,
            &letterbox,
            confidence_threshold,
            nms_threshold,
        )
    }
}

struct Candidate {
    bbox: [f32; 4],
    confidence: f32,
    class_id: usize,
    coefs: Vec<f32>,
}

/// Turn raw head outputs into instances in frame coordinates.
fn decode(
    preds: ArrayView2<'_, f32>,
    protos: Option<ArrayView3<'_, f32>>,
    letterbox: &Letterbox,
    confidence_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<RawInstance>> {
    let (features, anchors) = preds.dim();
    let num_masks = protos.map_or(0, |p| p.dim().0);
    let num_classes = features
        .checked_sub(4 + num_masks)
        .filter(|&n| n > 0)
        .ok_or_else(|| Error::OutputShape {
            reason: format!("{features} features cannot hold boxes, classes and {num_masks} mask coefficients"),
        })?;

    let mut candidates = Vec::new();
    for j in 0..anchors {
        let (class_id, confidence) = (0..num_classes)
            .map(|c| (c, preds[[4 + c, j]]))
            .fold((0, f32::NEG_INFINITY), |best, x| if x.1 > best.1 { x } else { best });
        if !(confidence >= confidence_threshold) {
            continue;
        }

        let (cx, cy, w, h) = (preds[[0, j]], preds[[1, j]], preds[[2, j]], preds[[3, j]]);
        let bbox = [
            (cx - w / 2.0) / letterbox.ratio,
            (cy - h / 2.0) / letterbox.ratio,
            (cx + w / 2.0) / letterbox.ratio,
            (cy + h / 2.0) / letterbox.ratio,
        ];
        let coefs = (0..num_masks)
            .map(|k| preds[[4 + num_classes + k, j]])
            .collect();

        candidates.push(Candidate {
            bbox,
            confidence,
            class_id,
            coefs,
        });
    }

    let before = candidates.len();
    non_max_suppression(&mut candidates, nms_threshold);
    debug!("Decoded {before} candidate(s), {} after NMS", candidates.len());

    candidates
        .into_iter()
        .map(|c| {
            let mask = match protos {
                Some(protos) => instance_mask(&c, protos, letterbox)?,
                None => None,
            };
            Ok(RawInstance {
                bbox: c.bbox,
                confidence: c.confidence,
                class_id: c.class_id,
                mask,
            })
        })
        .collect()
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = w * h;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

/// Greedy per-class suppression, keeping the highest scores.
fn non_max_suppression(candidates: &mut Vec<Candidate>, iou_threshold: f32) {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..candidates.len() {
        let suppressed = candidates[..kept].iter().any(|prev| {
            prev.class_id == candidates[index].class_id
                && iou(&prev.bbox, &candidates[index].bbox) > iou_threshold
        });
        if !suppressed {
            candidates.swap(kept, index);
            kept += 1;
        }
    }
    candidates.truncate(kept);
}

/// Threshold the prototype combination inside the instance's clamped box.
fn instance_mask(
    candidate: &Candidate,
    protos: ArrayView3<'_, f32>,
    letterbox: &Letterbox,
) -> Result<Option<InstanceMask>> {
    let Some(bbox) =
        BoundingBox::clamp_from_f32(candidate.bbox, letterbox.frame_width, letterbox.frame_height)
    else {
        return Ok(None);
    };

    let (nm, mh, mw) = protos.dim();
    let coefs = Array2::from_shape_vec((1, nm), candidate.coefs.clone())?;
    let flat = protos.to_shape((nm, mh * mw))?;
    let logits = coefs.dot(&flat);

    // Frame pixel -> model input pixel -> prototype cell.
    let scale_x = letterbox.ratio * mw as f32 / letterbox.input_size as f32;
    let scale_y = letterbox.ratio * mh as f32 / letterbox.input_size as f32;

    let (width, height) = (bbox.width().unsigned_abs(), bbox.height().unsigned_abs());
    let mut mask = GrayImage::new(width, height);
    let mut foreground = false;
    for y in 0..height {
        let fy = (bbox.y1 as f32 + y as f32 + 0.5) * scale_y;
        let py = (fy as usize).min(mh.saturating_sub(1));
        for x in 0..width {
            let fx = (bbox.x1 as f32 + x as f32 + 0.5) * scale_x;
            let px = (fx as usize).min(mw.saturating_sub(1));
            if sigmoid(logits[[0, py * mw + px]]) > MASK_THRESHOLD {
                mask.put_pixel(x, y, Luma([255]));
                foreground = true;
            }
        }
    }

    Ok(foreground.then_some(InstanceMask {
        origin: (bbox.x1, bbox.y1),
        mask,
    }))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

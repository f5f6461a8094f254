//! Embedded ONNX species classifier.

use super::SpeciesCandidate;
use crate::config::SpeciesConfig;
use crate::constants::species::{IMAGENET_MEAN, IMAGENET_STD, PROBABILITY_SUM_TOLERANCE};
use crate::error::{Error, Result};
use crate::inference::{Device, build_session};
use crate::labels::{LabelResolver, dense_class_names, read_class_list};
use crate::vision::{ChannelOrder, CropSpec};
use image::RgbImage;
use image::imageops::{self, FilterType};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A model mapping one crop to one score per class.
pub trait ProbabilityModel: Send {
    /// Raw per-class scores for `crop`, in output order.
    fn predict(&mut self, crop: &RgbImage, channel_order: ChannelOrder) -> Result<Vec<f32>>;
}

/// ONNX Runtime image classifier taking an NCHW ImageNet-normalised input.
pub struct OnnxClassifierModel {
    session: Session,
    input_size: (u32, u32),
}

impl OnnxClassifierModel {
    /// Load `path` on `device`.
    pub fn load(path: &Path, device: Device, input_size: (u32, u32)) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::SpeciesModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let session = build_session(path, device)?;
        Ok(Self {
            session,
            input_size,
        })
    }
}

impl ProbabilityModel for OnnxClassifierModel {
    fn predict(&mut self, crop: &RgbImage, channel_order: ChannelOrder) -> Result<Vec<f32>> {
        let (width, height) = self.input_size;
        let data = to_nchw(crop, self.input_size, channel_order);
        let shape = [1usize, 3, height as usize, width as usize];
        let tensor = Tensor::from_array((shape, data.into_boxed_slice())).map_err(inference_error)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(inference_error)?;
        let (_, value) = outputs.iter().next().ok_or_else(|| Error::OutputShape {
            reason: "classifier produced no outputs".to_string(),
        })?;
        let (_, scores) = value.try_extract_tensor::<f32>().map_err(inference_error)?;
        Ok(scores.to_vec())
    }
}

fn inference_error(e: impl std::fmt::Display) -> Error {
    Error::Inference {
        reason: e.to_string(),
    }
}

/// Planar float tensor data for `crop`, resized if needed and normalised
/// with ImageNet statistics in the crop's channel order.
fn to_nchw(crop: &RgbImage, (width, height): (u32, u32), channel_order: ChannelOrder) -> Vec<f32> {
    let resized;
    let image = if crop.dimensions() == (width, height) {
        crop
    } else {
        resized = imageops::resize(crop, width, height, FilterType::Triangle);
        &resized
    };

    let (mut mean, mut std) = (IMAGENET_MEAN, IMAGENET_STD);
    if channel_order == ChannelOrder::Bgr {
        mean.reverse();
        std.reverse();
    }

    let plane = (width * height) as usize;
    let mut data = vec![0f32; 3 * plane];
    for (idx, pixel) in image.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + idx] = (f32::from(pixel.0[c]) / 255.0 - mean[c]) / std[c];
        }
    }
    data
}

/// Turn raw scores into probabilities.
///
/// Scores already in `[0, 1]` that sum to one are kept; anything else is
/// passed through a numerically stable softmax.
pub fn to_probabilities(scores: &[f32]) -> Vec<f32> {
    let is_distribution = scores.iter().all(|s| (0.0..=1.0).contains(s))
        && (scores.iter().sum::<f32>() - 1.0).abs() <= PROBABILITY_SUM_TOLERANCE;
    if is_distribution {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exp.into_iter().map(|e| e / sum).collect()
    } else {
        vec![0.0; scores.len()]
    }
}

/// Classification backend over a [`ProbabilityModel`].
pub struct EmbeddedClassifier {
    model: Box<dyn ProbabilityModel>,
    class_names: Option<Vec<String>>,
    resolver: Arc<LabelResolver>,
    crop_spec: CropSpec,
}

impl EmbeddedClassifier {
    /// Assemble from parts.
    ///
    /// `class_names[i]` is the raw label of output `i`; without names the
    /// raw label is the decimal index.
    pub fn new(
        model: Box<dyn ProbabilityModel>,
        class_names: Option<Vec<String>>,
        resolver: Arc<LabelResolver>,
        crop_spec: CropSpec,
    ) -> Self {
        Self {
            model,
            class_names,
            resolver,
            crop_spec,
        }
    }

    /// Load the ONNX classifier and optional class-name file from `config`.
    pub fn load(config: &SpeciesConfig, device: Device, resolver: Arc<LabelResolver>) -> Result<Self> {
        let path = config
            .model_path
            .clone()
            .ok_or_else(|| Error::ConfigValidation {
                message: "species.model_path is required for the embedded backend".to_string(),
            })?;
        let model = OnnxClassifierModel::load(&path, device, config.input_size)?;

        let class_names = config
            .labels_path
            .as_deref()
            .map(load_class_names)
            .transpose()?;
        if let Some(names) = &class_names {
            debug!("Species classifier has {} class name(s)", names.len());
        }

        info!("Embedded species classifier loaded from {}", path.display());
        Ok(Self::new(
            Box::new(model),
            class_names,
            resolver,
            CropSpec {
                input_size: config.input_size,
                channel_order: config.channel_order,
            },
        ))
    }

    /// Crop layout the model expects.
    pub const fn crop_spec(&self) -> CropSpec {
        self.crop_spec
    }

    /// Run one forward pass and rank every class.
    pub fn classify(&mut self, crop: &RgbImage) -> Result<Vec<SpeciesCandidate>> {
        let scores = self.model.predict(crop, self.crop_spec.channel_order)?;
        let probabilities = to_probabilities(&scores);

        let mut candidates: Vec<SpeciesCandidate> = probabilities
            .into_iter()
            .enumerate()
            .map(|(index, confidence)| {
                let raw = self
                    .class_names
                    .as_ref()
                    .and_then(|names| names.get(index))
                    .cloned()
                    .unwrap_or_else(|| index.to_string());
                SpeciesCandidate {
                    name: self.resolver.format(&raw),
                    confidence,
                }
            })
            .collect();

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(candidates)
    }
}

/// Class names by output index; gaps in an index map become the index itself.
fn load_class_names(path: &Path) -> Result<Vec<String>> {
    Ok(dense_class_names(read_class_list(path)?))
}

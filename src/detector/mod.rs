//! Segmentation detector: the per-frame orchestrator.
//!
//! A detector is either not constructed (load failed) or ready. Each frame
//! runs the segmentation model, keeps target-class instances, and sends the
//! confident ones through crop extraction, species classification and label
//! resolution.

pub mod segmenter;
mod types;

pub use segmenter::{OnnxSegmenter, RawInstance, SegmentationModel, parse_class_names};
pub use types::{BoundingBox, Detection, FrameAnalysis};

use crate::config::{Config, DetectorConfig, Verbosity};
use crate::constants::{
    DEFAULT_TARGET_CLASS, LEGACY_BIRD_CLASS_ID, MODELS_DIR, SPECIES_GATE, species as species_defaults,
};
use crate::error::{Error, Result};
use crate::inference::{Device, select_device};
use crate::labels::{LabelResolver, LabelSources};
use crate::species::{ClassificationBackend, ClassifierRegistry, SpeciesCandidate, build_backend};
use crate::vision::{Frame, extract_crop, largest_polygon};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runtime-adjustable thresholds and filters.
#[derive(Debug, Clone, PartialEq)]
struct Settings {
    confidence_threshold: f32,
    nms_threshold: f32,
    species_threshold: f32,
    classes: Vec<String>,
    verbosity: Verbosity,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            confidence_threshold: config.detector.confidence_threshold,
            nms_threshold: config.detector.nms_threshold,
            species_threshold: config
                .species
                .as_ref()
                .map_or(species_defaults::DEFAULT_CONFIDENCE_THRESHOLD, |s| s.confidence_threshold),
            classes: config
                .detector
                .classes
                .iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
            verbosity: config.detector.verbosity,
        }
    }
}

/// Ordered locations tried for the detection model.
///
/// Absolute paths are used as given. Relative paths are tried as given,
/// under each configured model root, then in the per-user `models_dir` and
/// under `models/` in the current directory.
pub fn model_path_candidates(config: &DetectorConfig, models_dir: Option<&Path>) -> Vec<PathBuf> {
    let path = &config.model_path;
    if path.is_absolute() {
        return vec![path.clone()];
    }

    let mut candidates = vec![path.clone()];
    candidates.extend(config.model_roots.iter().map(|root| root.join(path)));
    if let Some(dir) = models_dir {
        candidates.push(dir.join(path));
    }
    candidates.push(Path::new(MODELS_DIR).join(path));

    let mut unique = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !unique.contains(&candidate) {
            unique.push(candidate);
        }
    }
    unique
}

/// First existing detection model candidate.
pub fn resolve_model_path(config: &DetectorConfig, models_dir: Option<&Path>) -> Result<PathBuf> {
    let candidates = model_path_candidates(config, models_dir);
    for candidate in &candidates {
        debug!("Looking for detection model at {}", candidate.display());
        if candidate.is_file() {
            return Ok(candidate.clone());
        }
    }
    Err(Error::ModelFileNotFound {
        path: config.model_path.clone(),
        searched: candidates.len(),
    })
}

/// Loaded two-stage detection pipeline.
///
/// Not safe for concurrent use; `detect` takes `&mut self`. Run one
/// detector per worker for throughput.
pub struct SegmentationDetector {
    model: Box<dyn SegmentationModel>,
    device: Device,
    backend: Option<ClassificationBackend>,
    settings: Settings,
}

impl std::fmt::Debug for SegmentationDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationDetector")
            .field("device", &self.device)
            .field("backend", &self.backend)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SegmentationDetector {
    /// Load the detection model and, if configured, the species stage.
    ///
    /// Fails only when the detection model cannot be found or loaded.
    /// Species backend and label source problems are logged and leave the
    /// detector without species capability.
    pub fn load(config: &Config, registry: &ClassifierRegistry) -> Result<Self> {
        let models_dir = crate::config::models_dir().ok();
        let model_path = resolve_model_path(&config.detector, models_dir.as_deref())?;

        let device = select_device(Some(config.inference.device));
        let model = OnnxSegmenter::load(&model_path, device, config.detector.input_size)?;

        let backend = config.species.as_ref().and_then(|species| {
            let resolver = Arc::new(LabelResolver::build(&LabelSources::discover(
                species.model_dir(),
                &config.labels,
            )));
            build_backend(species, device, resolver, registry)
        });

        Ok(Self::from_parts(Box::new(model), device, config, backend))
    }

    /// Assemble a detector from an already loaded model and backend.
    pub fn from_parts(
        model: Box<dyn SegmentationModel>,
        device: Device,
        config: &Config,
        backend: Option<ClassificationBackend>,
    ) -> Self {
        let settings = Settings::from(config);
        info!(
            "Detector ready on {device}: classes {:?}, confidence {}, species {}",
            settings.classes,
            settings.confidence_threshold,
            backend.as_ref().map_or("disabled".to_string(), |b| b.kind().to_string())
        );
        Self {
            model,
            device,
            backend,
            settings,
        }
    }

    /// Device every inference call runs on.
    pub const fn device(&self) -> Device {
        self.device
    }

    /// Whether a species backend is loaded.
    pub const fn has_species_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Replace thresholds, target classes and verbosity.
    ///
    /// Models, backend and label tables stay as loaded.
    pub fn update_config(&mut self, config: &Config) {
        let settings = Settings::from(config);
        if settings != self.settings {
            info!(
                "Detector settings updated: confidence {}, nms {}, species {}, classes {:?}",
                settings.confidence_threshold,
                settings.nms_threshold,
                settings.species_threshold,
                settings.classes
            );
        }
        self.settings = settings;
    }

    /// Detections for one frame. Never fails; errors yield an empty list.
    pub fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        self.analyze(frame).detections
    }

    /// Detections for one frame together with the ranked species
    /// candidates of every classified crop.
    pub fn analyze(&mut self, frame: &Frame) -> FrameAnalysis {
        match self.try_analyze(frame) {
            Ok(analysis) => {
                self.log_frame(&analysis);
                analysis
            }
            Err(e) => {
                error!("Frame at {:.3} dropped: {e}", frame.timestamp());
                FrameAnalysis::default()
            }
        }
    }

    fn try_analyze(&mut self, frame: &Frame) -> Result<FrameAnalysis> {
        if frame.is_empty() {
            warn!("Skipping empty frame");
            return Ok(FrameAnalysis::default());
        }

        let settings = &self.settings;
        let instances =
            self.model
                .infer(frame, settings.confidence_threshold, settings.nms_threshold)?;
        let names = self.model.class_names();

        let mut analysis = FrameAnalysis::default();
        for instance in instances {
            let Some(class_name) = target_class(names, &settings.classes, instance.class_id) else {
                continue;
            };
            if !(instance.confidence >= settings.confidence_threshold) {
                continue;
            }
            let Some(bbox) = BoundingBox::clamp_from_f32(instance.bbox, frame.width(), frame.height())
            else {
                debug!("Dropping instance outside the frame: {:?}", instance.bbox);
                continue;
            };

            let polygon = instance.mask.as_ref().and_then(largest_polygon);
            let mut detection = Detection::new(
                bbox,
                instance.confidence,
                instance.class_id,
                class_name,
                polygon,
                frame.timestamp(),
            );

            let candidates = if detection.confidence() >= SPECIES_GATE {
                classify(self.backend.as_mut(), frame, &detection)
            } else {
                Vec::new()
            };
            if let Some(top) = candidates.first()
                && top.confidence >= settings.species_threshold
            {
                detection.set_species(top.name.clone(), top.confidence);
            }

            analysis.detections.push(detection);
            analysis.candidates.push(candidates);
        }

        Ok(analysis)
    }

    fn log_frame(&self, analysis: &FrameAnalysis) {
        let verbosity = self.settings.verbosity;
        if analysis.detections.is_empty() {
            debug!("No target detections");
            return;
        }

        info!("{} target detection(s)", analysis.detections.len());
        if verbosity < Verbosity::Standard {
            return;
        }

        for (index, detection) in analysis.detections.iter().enumerate() {
            match detection.species() {
                Some(species) => info!(
                    "  {} {:.2} at {:?}: {species} ({:.2})",
                    detection.class_name(),
                    detection.confidence(),
                    detection.center(),
                    detection.species_confidence().unwrap_or_default()
                ),
                None => info!(
                    "  {} {:.2} at {:?}",
                    detection.class_name(),
                    detection.confidence(),
                    detection.center()
                ),
            }

            if verbosity == Verbosity::Detailed {
                for candidate in analysis.candidates_for(index) {
                    info!("    {:.4} {}", candidate.confidence, candidate.name);
                }
            }
        }
    }
}

/// Class name of `class_id` if it is a target class.
///
/// Without model class names only the legacy COCO bird id qualifies.
fn target_class(names: Option<&[String]>, targets: &[String], class_id: usize) -> Option<String> {
    match names {
        Some(names) if !names.is_empty() => names
            .get(class_id)
            .filter(|name| targets.iter().any(|t| t.eq_ignore_ascii_case(name.trim())))
            .cloned(),
        _ => (class_id == LEGACY_BIRD_CLASS_ID).then(|| DEFAULT_TARGET_CLASS.to_string()),
    }
}

fn classify(
    backend: Option<&mut ClassificationBackend>,
    frame: &Frame,
    detection: &Detection,
) -> Vec<SpeciesCandidate> {
    let Some(backend) = backend else {
        return Vec::new();
    };

    let Some(crop) = extract_crop(frame, &detection.bbox(), detection.polygon(), &backend.crop_spec())
    else {
        debug!("No crop for {:?}", detection.bbox());
        return Vec::new();
    };

    match backend.classify(&crop) {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("Species classification skipped: {e}");
            Vec::new()
        }
    }
}

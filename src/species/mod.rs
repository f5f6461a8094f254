//! Species classification stage.
//!
//! Two interchangeable backends share one contract: a crop goes in, a list
//! of candidates sorted by descending confidence comes out, produced by a
//! single inference call. Names are already run through the label resolver.

pub mod embedded;
pub mod external;

pub use embedded::{EmbeddedClassifier, OnnxClassifierModel, ProbabilityModel};
pub use external::{ClassifierFn, ClassifierRegistry, ExternalClassifier};

use crate::config::{SpeciesBackendKind, SpeciesConfig};
use crate::error::{Error, Result};
use crate::inference::Device;
use crate::labels::LabelResolver;
use crate::vision::CropSpec;
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// One ranked species guess.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesCandidate {
    /// Display name.
    pub name: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

/// A constructed classification backend.
pub enum ClassificationBackend {
    /// ONNX classifier owned by the detector.
    Embedded(EmbeddedClassifier),
    /// Host-registered callable.
    External(ExternalClassifier),
}

impl ClassificationBackend {
    /// Rank candidates for one crop.
    pub fn classify(&mut self, crop: &RgbImage) -> Result<Vec<SpeciesCandidate>> {
        match self {
            Self::Embedded(backend) => backend.classify(crop),
            Self::External(backend) => backend.classify(crop),
        }
    }

    /// Crop layout the backend expects.
    pub const fn crop_spec(&self) -> CropSpec {
        match self {
            Self::Embedded(backend) => backend.crop_spec(),
            Self::External(backend) => backend.crop_spec(),
        }
    }

    /// Which variant this is.
    pub const fn kind(&self) -> SpeciesBackendKind {
        match self {
            Self::Embedded(_) => SpeciesBackendKind::Embedded,
            Self::External(_) => SpeciesBackendKind::External,
        }
    }
}

impl std::fmt::Debug for ClassificationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded(backend) => f
                .debug_tuple("Embedded")
                .field(&backend.crop_spec())
                .finish(),
            Self::External(backend) => f.debug_tuple("External").field(&backend.name()).finish(),
        }
    }
}

/// Construct the backend described by `config`.
pub fn try_build_backend(
    config: &SpeciesConfig,
    device: Device,
    resolver: Arc<LabelResolver>,
    registry: &ClassifierRegistry,
) -> Result<ClassificationBackend> {
    let crop_spec = CropSpec {
        input_size: config.input_size,
        channel_order: config.channel_order,
    };

    match config.backend {
        SpeciesBackendKind::Embedded => {
            EmbeddedClassifier::load(config, device, resolver).map(ClassificationBackend::Embedded)
        }
        SpeciesBackendKind::External => {
            let (Some(module), Some(function)) = (&config.module, &config.function) else {
                return Err(Error::ConfigValidation {
                    message: "species.module and species.function are required for the external backend"
                        .to_string(),
                });
            };
            let classifier = registry.resolve(module, function)?;
            Ok(ClassificationBackend::External(ExternalClassifier::new(
                format!("{module}::{function}"),
                classifier,
                resolver,
                crop_spec,
                device,
            )))
        }
    }
}

/// Construct the backend, logging and swallowing any failure.
///
/// A detector without a backend still reports detections, just without
/// species fields.
pub fn build_backend(
    config: &SpeciesConfig,
    device: Device,
    resolver: Arc<LabelResolver>,
    registry: &ClassifierRegistry,
) -> Option<ClassificationBackend> {
    match try_build_backend(config, device, resolver, registry) {
        Ok(backend) => {
            info!("Species backend ready: {} on {device}", backend.kind());
            Some(backend)
        }
        Err(e) => {
            error!("Species classification disabled: {e}");
            None
        }
    }
}

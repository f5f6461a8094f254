//! Host-registered classifier callables.
//!
//! A host process registers plain Rust closures under a `module::function`
//! name before loading the detector; configuration then selects one by
//! name. The lookup happens once at load time.

use super::SpeciesCandidate;
use crate::error::{BoxError, Error, Result};
use crate::inference::Device;
use crate::labels::LabelResolver;
use crate::vision::CropSpec;
use image::RgbImage;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::debug;

/// Signature of an external classifier: crop in, best `(label, confidence)` out.
pub type ClassifierFn =
    Arc<dyn Fn(&RgbImage) -> std::result::Result<(String, f32), BoxError> + Send + Sync>;

/// Named external classifiers available to `build_backend`.
#[derive(Clone, Default)]
pub struct ClassifierRegistry {
    entries: BTreeMap<String, ClassifierFn>,
}

impl std::fmt::Debug for ClassifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierRegistry")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn qualified(module: &str, function: &str) -> String {
    format!("{module}::{function}")
}

impl ClassifierRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `classifier` as `module::function`, replacing any previous entry.
    pub fn register<F>(&mut self, module: &str, function: &str, classifier: F)
    where
        F: Fn(&RgbImage) -> std::result::Result<(String, f32), BoxError> + Send + Sync + 'static,
    {
        let name = qualified(module, function);
        debug!("Registered external classifier {name}");
        self.entries.insert(name, Arc::new(classifier));
    }

    /// Look up `module::function`.
    pub fn resolve(&self, module: &str, function: &str) -> Result<ClassifierFn> {
        self.entries
            .get(&qualified(module, function))
            .cloned()
            .ok_or_else(|| Error::ExternalClassifierMissing {
                module: module.to_string(),
                function: function.to_string(),
            })
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classification backend wrapping an external callable.
pub struct ExternalClassifier {
    name: String,
    classifier: ClassifierFn,
    resolver: Arc<LabelResolver>,
    crop_spec: CropSpec,
    device: Device,
}

impl ExternalClassifier {
    /// Wrap an already resolved callable.
    pub fn new(
        name: String,
        classifier: ClassifierFn,
        resolver: Arc<LabelResolver>,
        crop_spec: CropSpec,
        device: Device,
    ) -> Self {
        Self {
            name,
            classifier,
            resolver,
            crop_spec,
            device,
        }
    }

    /// Registered name (`module::function`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Crop layout handed to the callable.
    pub const fn crop_spec(&self) -> CropSpec {
        self.crop_spec
    }

    /// Device the session was configured for.
    pub const fn device(&self) -> Device {
        self.device
    }

    /// Run the callable once.
    ///
    /// Errors and panics raised by the callable are caught and reported as
    /// [`Error::ExternalClassifier`]. The result is a single candidate.
    pub fn classify(&self, crop: &RgbImage) -> Result<Vec<SpeciesCandidate>> {
        let failed = |reason: String| Error::ExternalClassifier {
            name: self.name.clone(),
            reason,
        };

        let (label, confidence) = match catch_unwind(AssertUnwindSafe(|| (self.classifier)(crop))) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return Err(failed(e.to_string())),
            Err(payload) => return Err(failed(format!("panicked: {}", panic_message(&*payload)))),
        };

        if !confidence.is_finite() {
            return Err(failed(format!("returned non-finite confidence {confidence}")));
        }

        Ok(vec![SpeciesCandidate {
            name: self.resolver.format(&label),
            confidence: confidence.clamp(0.0, 1.0),
        }])
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

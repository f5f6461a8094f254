//! Configuration type definitions.

use crate::constants::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_SIZE, DEFAULT_MODEL_PATH, DEFAULT_NMS_THRESHOLD,
    DEFAULT_TARGET_CLASS, labels, species,
};
use crate::inference::DeviceHint;
use crate::vision::ChannelOrder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Segmentation detector settings.
    pub detector: DetectorConfig,

    /// Inference device settings.
    pub inference: InferenceConfig,

    /// Species classification stage. Absent disables the stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<SpeciesConfig>,

    /// Label-mapping sources for species names.
    pub labels: LabelsConfig,
}

/// Segmentation detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Path to the segmentation ONNX model, absolute or relative to a model root.
    pub model_path: PathBuf,

    /// Extra directories searched for `model_path`, in order.
    pub model_roots: Vec<PathBuf>,

    /// Square model input size in pixels.
    pub input_size: u32,

    /// Detection-stage confidence threshold.
    pub confidence_threshold: f32,

    /// IoU threshold for non-maximum suppression.
    pub nms_threshold: f32,

    /// Target class names (case-insensitive).
    pub classes: Vec<String>,

    /// Per-frame log verbosity.
    pub verbosity: Verbosity,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_roots: Vec::new(),
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            classes: vec![DEFAULT_TARGET_CLASS.to_string()],
            verbosity: Verbosity::default(),
        }
    }
}

/// Inference settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Requested device (`auto`, `cpu`, `cuda`, `cuda:N` or `N`).
    pub device: DeviceHint,
}

/// Species classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesConfig {
    /// Which backend variant to construct.
    pub backend: SpeciesBackendKind,

    /// Path to the embedded classifier ONNX model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Optional class-name file for the embedded classifier outputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels_path: Option<PathBuf>,

    /// Minimum top-candidate confidence for a species to be reported.
    pub confidence_threshold: f32,

    /// Classifier input size as `[width, height]`.
    pub input_size: (u32, u32),

    /// Channel order the classifier expects.
    pub channel_order: ChannelOrder,

    /// Registry module name of an external classifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Registry function name of an external classifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self {
            backend: SpeciesBackendKind::default(),
            model_path: None,
            labels_path: None,
            confidence_threshold: species::DEFAULT_CONFIDENCE_THRESHOLD,
            input_size: species::DEFAULT_INPUT_SIZE,
            channel_order: ChannelOrder::Rgb,
            module: None,
            function: None,
        }
    }
}

impl SpeciesConfig {
    /// Directory holding the species model, where label sources are probed.
    ///
    /// `None` without a model path or for a bare file name.
    pub fn model_dir(&self) -> Option<&Path> {
        self.model_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

/// Species backend variants.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeciesBackendKind {
    /// ONNX classifier loaded from `model_path`.
    #[default]
    Embedded,
    /// Host-registered callable looked up by `module` and `function`.
    External,
}

impl std::fmt::Display for SpeciesBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded => write!(f, "embedded"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Label-mapping sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelsConfig {
    /// ID→name table (JSON object or CSV/TSV rows).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_map: Option<PathBuf>,

    /// Dataset metadata files with class lists (YAML, JSON or plain text).
    pub metadata: Vec<PathBuf>,

    /// Namespace used in placeholders for unmapped numeric labels.
    pub namespace: String,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            id_map: None,
            metadata: Vec::new(),
            namespace: labels::DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Per-frame logging tiers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Frame-level detection counts only.
    Minimal,
    /// Counts plus per-instance confidences and species.
    #[default]
    Standard,
    /// Everything, including ranked species candidates.
    Detailed,
}

impl std::str::FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "standard" => Ok(Self::Standard),
            "detailed" => Ok(Self::Detailed),
            other => Err(format!("unknown verbosity: {other}")),
        }
    }
}

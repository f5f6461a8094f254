//! Application-wide constants.
//!
//! All magic numbers and strings are defined here to ensure consistency
//! and make changes easy to track.

/// Application name used for config directories and user-facing messages.
pub const APP_NAME: &str = "skywarden";

/// Default detection-stage confidence threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.35;

/// Default IoU threshold for non-maximum suppression.
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

/// Default square input size of the segmentation model.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default detector model path, resolved against the model roots.
pub const DEFAULT_MODEL_PATH: &str = "yolov8n-seg.onnx";

/// Target class searched for when no classes are configured.
pub const DEFAULT_TARGET_CLASS: &str = "bird";

/// Directory name appended to search roots when resolving model paths.
pub const MODELS_DIR: &str = "models";

/// Species gate: minimum detection confidence before classification runs.
///
/// Applied regardless of the configured thresholds to bound per-frame compute.
pub const SPECIES_GATE: f32 = 0.20;

/// Class id of "bird" in the 80-class COCO taxonomy.
///
/// Used only when the detection model carries no class-name metadata.
pub const LEGACY_BIRD_CLASS_ID: usize = 14;

/// Species classification defaults.
pub mod species {
    /// Default species confidence threshold.
    pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

    /// Default classifier input size (width, height).
    pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);

    /// ImageNet channel means (RGB).
    pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

    /// ImageNet channel standard deviations (RGB).
    pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

    /// Tolerance when deciding whether a classifier output already sums to one.
    pub const PROBABILITY_SUM_TOLERANCE: f32 = 1e-3;
}

/// Label resolution constants.
pub mod labels {
    /// Default namespace used in placeholder names for unmapped numeric labels.
    pub const DEFAULT_NAMESPACE: &str = "Species";

    /// Width of the zero-padded key form stored for numeric ids.
    pub const PADDED_WIDTH: usize = 4;

    /// Class indices at or above this are ignored when building name lists.
    pub const MAX_CLASS_INDEX: usize = 100_000;

    /// ID→name tables probed next to the species model, in order.
    pub const ID_MAP_CANDIDATES: &[&str] = &["id_to_name.json", "id_to_name.csv", "taxonomy.csv"];

    /// Dataset metadata files probed next to the species model, in order.
    pub const METADATA_CANDIDATES: &[&str] =
        &["data.yaml", "dataset.yaml", "classes.json", "labels.txt"];
}

/// Segmentation decoding constants.
pub mod segmentation {
    /// Values in `[0, 1]` used to pad the letterboxed model input.
    pub const LETTERBOX_FILL: f32 = 144.0 / 255.0;

    /// Mask probability above which a pixel belongs to the instance.
    pub const MASK_THRESHOLD: f32 = 0.5;

    /// Douglas-Peucker tolerance in pixels for simplifying mask contours.
    pub const POLYGON_EPSILON: f64 = 1.0;

    /// ONNX metadata key holding the class-name dictionary.
    pub const NAMES_METADATA_KEY: &str = "names";
}

/// Confidence value bounds.
pub mod confidence {
    /// Minimum valid confidence value.
    pub const MIN: f32 = 0.0;
    /// Maximum valid confidence value.
    pub const MAX: f32 = 1.0;
}

/// Image file extensions picked up when scanning input directories.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

//! Error types for skywarden.

/// Result type alias for skywarden operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by host-supplied classifier callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for skywarden.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration directory could not be determined.
    #[error("could not determine configuration directory for this platform")]
    ConfigDirNotFound,

    /// Failed to read configuration file.
    #[error("failed to read config file '{path}'")]
    ConfigRead {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("failed to parse config file '{path}'")]
    ConfigParse {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// Failed to write configuration file.
    #[error("failed to write config file '{path}'")]
    ConfigWrite {
        /// Path to the config file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize configuration.
    #[error("failed to serialize config")]
    ConfigSerialize {
        /// Underlying serialization error.
        #[source]
        source: toml::ser::Error,
    },

    /// Invalid device string.
    #[error("invalid device '{value}' (expected auto, cpu, cuda, cuda:N or N)")]
    InvalidDevice {
        /// Invalid value.
        value: String,
    },

    /// Detection model could not be found under any candidate root.
    #[error("model file not found: {path} (searched {searched} location(s))")]
    ModelFileNotFound {
        /// Path as configured.
        path: std::path::PathBuf,
        /// Number of candidate locations tried.
        searched: usize,
    },

    /// Species model file does not exist.
    #[error("species model file does not exist: {path}")]
    SpeciesModelNotFound {
        /// Path to the missing model file.
        path: std::path::PathBuf,
    },

    /// Failed to build an ONNX Runtime session.
    #[error("failed to load model '{path}': {reason}")]
    SessionBuild {
        /// Model path.
        path: std::path::PathBuf,
        /// Description of the build failure.
        reason: String,
    },

    /// Inference failed.
    #[error("inference failed: {reason}")]
    Inference {
        /// Description of the inference failure.
        reason: String,
    },

    /// Model output did not have the expected layout.
    #[error("unexpected model output: {reason}")]
    OutputShape {
        /// Description of the mismatch.
        reason: String,
    },

    /// Mask prototype arithmetic failed.
    #[error("mask decoding failed")]
    MaskDecode(#[from] ndarray::ShapeError),

    /// External classifier is not registered.
    #[error("external classifier '{module}::{function}' is not registered")]
    ExternalClassifierMissing {
        /// Module path from configuration.
        module: String,
        /// Function name from configuration.
        function: String,
    },

    /// External classifier failed while classifying a crop.
    #[error("external classifier '{name}' failed: {reason}")]
    ExternalClassifier {
        /// Registered name of the classifier.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// Failed to read a label source.
    #[error("failed to read label source '{path}'")]
    LabelSourceRead {
        /// Path to the label source.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a label source.
    #[error("failed to parse label source '{path}': {reason}")]
    LabelSourceParse {
        /// Path to the label source.
        path: std::path::PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// Failed to decode an input image.
    #[error("failed to decode image '{path}'")]
    ImageDecode {
        /// Path to the image file.
        path: std::path::PathBuf,
        /// Underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// No input images were found.
    #[error("no readable images found in the provided paths")]
    NoInputImages,

    /// Failed to serialize detections.
    #[error("failed to serialize detections")]
    JsonSerialize {
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },
}

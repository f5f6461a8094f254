//! Configuration loading and management.

mod file;
mod types;
mod validate;

pub use file::{
    config_dir, config_file_path, load_config_file, load_default_config, models_dir, save_config,
    save_default_config,
};
pub use types::{
    Config, DetectorConfig, InferenceConfig, LabelsConfig, SpeciesBackendKind, SpeciesConfig,
    Verbosity,
};
pub use validate::{validate_config, validate_species_config};

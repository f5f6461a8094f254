//! Configuration validation.

use crate::config::{Config, SpeciesBackendKind, SpeciesConfig};
use crate::constants::confidence;
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_detector(config)?;
    if let Some(species) = &config.species {
        validate_species_config(species)?;
    }
    Ok(())
}

fn check_unit_range(name: &str, value: f32) -> Result<()> {
    if !(confidence::MIN..=confidence::MAX).contains(&value) {
        return Err(Error::ConfigValidation {
            message: format!(
                "{name} must be between {} and {}, got {value}",
                confidence::MIN,
                confidence::MAX
            ),
        });
    }
    Ok(())
}

/// Validate detector settings.
fn validate_detector(config: &Config) -> Result<()> {
    let detector = &config.detector;

    check_unit_range("confidence_threshold", detector.confidence_threshold)?;
    check_unit_range("nms_threshold", detector.nms_threshold)?;

    if detector.input_size == 0 {
        return Err(Error::ConfigValidation {
            message: "input_size must be at least 1".to_string(),
        });
    }

    if detector.classes.iter().all(|c| c.trim().is_empty()) {
        return Err(Error::ConfigValidation {
            message: "classes must name at least one target class".to_string(),
        });
    }

    Ok(())
}

/// Validate species settings.
///
/// Only checks shape and ranges; missing model files are a load-time
/// degradation, not a configuration error.
pub fn validate_species_config(species: &SpeciesConfig) -> Result<()> {
    check_unit_range("species.confidence_threshold", species.confidence_threshold)?;

    let (width, height) = species.input_size;
    if width == 0 || height == 0 {
        return Err(Error::ConfigValidation {
            message: format!("species.input_size must be positive, got [{width}, {height}]"),
        });
    }

    match species.backend {
        SpeciesBackendKind::Embedded if species.model_path.is_none() => {
            Err(Error::ConfigValidation {
                message: "species.model_path is required for the embedded backend".to_string(),
            })
        }
        SpeciesBackendKind::External if species.module.is_none() || species.function.is_none() => {
            Err(Error::ConfigValidation {
                message: "species.module and species.function are required for the external backend"
                    .to_string(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_confidence() {
        let mut config = Config::default();
        config.detector.confidence_threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_invalid_nms() {
        let mut config = Config::default();
        config.detector.nms_threshold = -0.1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_classes() {
        let mut config = Config::default();
        config.detector.classes = vec![String::new()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_embedded_requires_model_path() {
        let species = SpeciesConfig::default();
        let result = validate_species_config(&species);
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn test_validate_external_requires_module_and_function() {
        let mut species = SpeciesConfig {
            backend: SpeciesBackendKind::External,
            module: Some("hawkid".to_string()),
            ..Default::default()
        };
        assert!(validate_species_config(&species).is_err());

        species.function = Some("classify".to_string());
        assert!(validate_species_config(&species).is_ok());
    }

    #[test]
    fn test_validate_zero_species_input_size() {
        let species = SpeciesConfig {
            model_path: Some("species.onnx".into()),
            input_size: (0, 224),
            ..Default::default()
        };
        assert!(validate_species_config(&species).is_err());
    }
}

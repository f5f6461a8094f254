//! CLI argument validators.

use crate::inference::DeviceHint;

/// Parse and validate confidence value (0.0-1.0).
pub fn parse_confidence(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!(
            "confidence must be between 0.0 and 1.0, got {value}"
        ));
    }

    Ok(value)
}

/// Parse a device hint (`auto`, `cpu`, `cuda`, `cuda:N`, `N`).
pub fn parse_device(s: &str) -> Result<DeviceHint, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

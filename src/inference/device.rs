//! Inference device selection.
//!
//! The device is chosen once when a detector loads and is used by every
//! session the detector owns. Selection never fails: anything that cannot
//! be honoured degrades to CPU with a warning.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Device every inference call of a detector runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Device {
    /// Host CPU.
    Cpu,
    /// CUDA-capable accelerator by ordinal.
    Accelerator(u32),
}

impl Device {
    /// Whether this is an accelerator.
    pub const fn is_accelerator(self) -> bool {
        matches!(self, Self::Accelerator(_))
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Accelerator(index) => write!(f, "cuda:{index}"),
        }
    }
}

/// Requested device, as written in configuration or on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceHint {
    /// Probe the platform.
    #[default]
    Auto,
    /// Force CPU.
    Cpu,
    /// A specific accelerator ordinal.
    Accelerator(u32),
}

impl std::str::FromStr for DeviceHint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        let invalid = || Error::InvalidDevice {
            value: s.to_string(),
        };

        match value.as_str() {
            "" | "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Accelerator(0)),
            other => {
                let index = other
                    .strip_prefix("cuda:")
                    .or_else(|| other.strip_prefix("gpu:"))
                    .unwrap_or(other);
                index.parse::<u32>().map(Self::Accelerator).map_err(|_| invalid())
            }
        }
    }
}

impl TryFrom<String> for DeviceHint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceHint> for String {
    fn from(hint: DeviceHint) -> Self {
        match hint {
            DeviceHint::Auto => "auto".to_string(),
            DeviceHint::Cpu => "cpu".to_string(),
            DeviceHint::Accelerator(index) => format!("cuda:{index}"),
        }
    }
}

/// What the host offers in terms of accelerators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformProbe {
    /// Board model when running on an embedded accelerator (e.g. Jetson).
    pub embedded_board: Option<String>,
    /// Number of discrete CUDA devices.
    pub discrete_accelerators: u32,
}

impl PlatformProbe {
    /// Inspect the running host.
    pub fn detect() -> Self {
        let embedded_board = detect_embedded_board(Path::new("/"));
        // Jetson boards expose their iGPU through the same CUDA runtime;
        // the discrete probe is skipped there.
        let discrete_accelerators = if embedded_board.is_some() {
            0
        } else {
            super::cuda_detection::discrete_device_count()
        };

        let probe = Self {
            embedded_board,
            discrete_accelerators,
        };
        debug!("Platform probe: {:?}", probe);
        probe
    }

    /// Whether accelerator `index` exists on this host.
    pub fn has_accelerator(&self, index: u32) -> bool {
        (self.embedded_board.is_some() && index == 0) || index < self.discrete_accelerators
    }

    /// The device selected when nothing is requested.
    pub fn preferred(&self) -> Device {
        if self.has_accelerator(0) {
            Device::Accelerator(0)
        } else {
            Device::Cpu
        }
    }
}

/// Look for NVIDIA Tegra/Jetson markers below `root`.
fn detect_embedded_board(root: &Path) -> Option<String> {
    let model_path = root.join("proc/device-tree/model");
    if let Ok(model) = std::fs::read_to_string(&model_path) {
        let model = model.trim_matches('\0').trim().to_string();
        let lower = model.to_lowercase();
        if lower.contains("jetson") || lower.contains("tegra") {
            return Some(model);
        }
    }

    if root.join("etc/nv_tegra_release").exists() {
        return Some("NVIDIA Tegra".to_string());
    }

    None
}

/// Select the inference device, probing the running host.
pub fn select_device(requested: Option<DeviceHint>) -> Device {
    select_device_with(requested, &PlatformProbe::detect())
}

/// Select the inference device against an explicit probe result.
pub fn select_device_with(requested: Option<DeviceHint>, probe: &PlatformProbe) -> Device {
    let device = match requested.unwrap_or_default() {
        DeviceHint::Auto => {
            let device = probe.preferred();
            match (&probe.embedded_board, device) {
                (Some(board), Device::Accelerator(_)) => {
                    info!("Auto mode: embedded accelerator on {board}");
                }
                (None, Device::Accelerator(_)) => info!("Auto mode: CUDA device available"),
                _ => info!("Auto mode: no accelerator found, using CPU"),
            }
            device
        }
        DeviceHint::Cpu => {
            info!("Requested device: CPU");
            Device::Cpu
        }
        DeviceHint::Accelerator(index) if probe.has_accelerator(index) => {
            info!("Requested device: cuda:{index}");
            Device::Accelerator(index)
        }
        DeviceHint::Accelerator(index) => {
            warn!("Accelerator cuda:{index} requested but not available, falling back to CPU");
            Device::Cpu
        }
    };

    debug!("Selected device: {device}");
    device
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cpu_only() -> PlatformProbe {
        PlatformProbe::default()
    }

    fn jetson() -> PlatformProbe {
        PlatformProbe {
            embedded_board: Some("NVIDIA Jetson Orin Nano".to_string()),
            discrete_accelerators: 0,
        }
    }

    fn two_gpus() -> PlatformProbe {
        PlatformProbe {
            embedded_board: None,
            discrete_accelerators: 2,
        }
    }

    #[test]
    fn test_parse_device_hints() {
        let cases = [
            ("auto", DeviceHint::Auto),
            ("", DeviceHint::Auto),
            ("CPU", DeviceHint::Cpu),
            ("cuda", DeviceHint::Accelerator(0)),
            ("gpu", DeviceHint::Accelerator(0)),
            ("cuda:1", DeviceHint::Accelerator(1)),
            ("2", DeviceHint::Accelerator(2)),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<DeviceHint>().unwrap(), expected, "input {input:?}");
        }
        assert!("tpu".parse::<DeviceHint>().is_err());
        assert!("cuda:x".parse::<DeviceHint>().is_err());
    }

    #[test]
    fn test_hint_string_round_trip() {
        let hint = DeviceHint::Accelerator(3);
        let text: String = hint.into();
        assert_eq!(text, "cuda:3");
        assert_eq!(text.parse::<DeviceHint>().unwrap(), hint);
    }

    #[test]
    fn test_auto_prefers_embedded_accelerator() {
        assert_eq!(select_device_with(None, &jetson()), Device::Accelerator(0));
    }

    #[test]
    fn test_auto_prefers_discrete_accelerator() {
        assert_eq!(
            select_device_with(Some(DeviceHint::Auto), &two_gpus()),
            Device::Accelerator(0)
        );
    }

    #[test]
    fn test_auto_without_accelerator_is_cpu() {
        assert_eq!(select_device_with(None, &cpu_only()), Device::Cpu);
    }

    #[test]
    fn test_unavailable_accelerator_falls_back_to_cpu() {
        assert_eq!(
            select_device_with(Some(DeviceHint::Accelerator(0)), &cpu_only()),
            Device::Cpu
        );
        assert_eq!(
            select_device_with(Some(DeviceHint::Accelerator(5)), &two_gpus()),
            Device::Cpu
        );
        assert_eq!(
            select_device_with(Some(DeviceHint::Accelerator(1)), &jetson()),
            Device::Cpu
        );
    }

    #[test]
    fn test_explicit_available_accelerator() {
        assert_eq!(
            select_device_with(Some(DeviceHint::Accelerator(1)), &two_gpus()),
            Device::Accelerator(1)
        );
    }

    #[test]
    fn test_cpu_hint_wins_over_accelerators() {
        assert_eq!(select_device_with(Some(DeviceHint::Cpu), &two_gpus()), Device::Cpu);
    }

    #[test]
    fn test_detect_embedded_board_from_device_tree() {
        let root = tempfile::tempdir().unwrap();
        let dt = root.path().join("proc/device-tree");
        std::fs::create_dir_all(&dt).unwrap();
        std::fs::write(dt.join("model"), "NVIDIA Jetson Xavier NX\0").unwrap();

        assert_eq!(
            detect_embedded_board(root.path()).as_deref(),
            Some("NVIDIA Jetson Xavier NX")
        );
    }

    #[test]
    fn test_detect_embedded_board_from_tegra_release() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("etc")).unwrap();
        std::fs::write(root.path().join("etc/nv_tegra_release"), "# R35").unwrap();

        assert!(detect_embedded_board(root.path()).is_some());
    }

    #[test]
    fn test_detect_embedded_board_absent() {
        let root = tempfile::tempdir().unwrap();
        assert!(detect_embedded_board(root.path()).is_none());
    }

    #[test]
    fn test_select_device_on_real_host_never_fails() {
        let device = select_device(Some(DeviceHint::Accelerator(7)));
        let _ = device.is_accelerator();
    }

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Accelerator(2).to_string(), "cuda:2");
    }
}

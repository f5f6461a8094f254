//! ONNX Runtime session construction on the selected device.

use super::Device;
use crate::error::{Error, Result};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use std::path::Path;
use tracing::{debug, info};

/// Build a session for `model_path` bound to `device`.
///
/// ONNX Runtime falls back to CPU on its own if the CUDA provider fails to
/// register; that case is logged by ORT itself.
pub fn build_session(model_path: &Path, device: Device) -> Result<Session> {
    let builder = Session::builder()
        .map_err(|e| session_error(model_path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| session_error(model_path, e))?;

    let mut builder = match device {
        Device::Cpu => builder,
        Device::Accelerator(index) => {
            debug!("Registering CUDA execution provider for device {index}");
            let provider = CUDAExecutionProvider::default()
                .with_device_id(i32::try_from(index).unwrap_or(0))
                .build();
            builder
                .with_execution_providers([provider])
                .map_err(|e| session_error(model_path, e))?
        }
    };

    let session = builder
        .commit_from_file(model_path)
        .map_err(|e| session_error(model_path, e))?;
    info!("Loaded {} on {}", model_path.display(), device);
    Ok(session)
}

fn session_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::SessionBuild {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Read a custom metadata entry from a loaded model.
pub fn custom_metadata(session: &Session, key: &str) -> Option<String> {
    let metadata = match session.metadata() {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Model metadata unavailable: {e}");
            return None;
        }
    };

    let value = metadata.custom(key);
    if value.is_none() {
        debug!("Model metadata has no '{key}' entry");
    }
    value
}

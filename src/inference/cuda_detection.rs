//! CUDA runtime and device detection.
//!
//! Detection is version-agnostic: any CUDA runtime the ONNX Runtime CUDA
//! provider could bind to counts. Device nodes are only inspected on Linux;
//! elsewhere a present runtime is assumed to drive one device.

use super::library_detection::{check_library_pattern_exists, get_library_search_paths};
use std::path::Path;
use tracing::debug;

/// CUDA runtime library patterns for the current platform.
pub fn get_cuda_library_patterns() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["cudart64_*.dll"]
    }
    #[cfg(target_os = "linux")]
    {
        &["libcudart.so.*"]
    }
    #[cfg(target_os = "macos")]
    {
        &["libcudart.*.dylib"]
    }
    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        &[]
    }
}

/// Check if a CUDA runtime library is installed.
pub fn is_cuda_available() -> bool {
    let patterns = get_cuda_library_patterns();
    let search_paths = get_library_search_paths();

    debug!(
        "Checking for CUDA runtime matching {:?} in {} paths",
        patterns,
        search_paths.len()
    );

    let found = check_library_pattern_exists(&search_paths, patterns);
    debug!(
        "CUDA runtime libraries {}",
        if found { "found" } else { "not found" }
    );
    found
}

/// Count `nvidiaN` device nodes under `dev_dir`.
pub fn count_device_nodes(dev_dir: &Path) -> u32 {
    let Ok(entries) = std::fs::read_dir(dev_dir) else {
        return 0;
    };

    let count = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix("nvidia"))
                .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        })
        .count();

    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Number of discrete CUDA devices usable by ONNX Runtime.
pub fn discrete_device_count() -> u32 {
    if !is_cuda_available() {
        return 0;
    }

    #[cfg(target_os = "linux")]
    {
        let nodes = count_device_nodes(Path::new("/dev"));
        debug!("Found {} NVIDIA device node(s)", nodes);
        nodes
    }

    #[cfg(not(target_os = "linux"))]
    {
        1
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_count_device_nodes() {
        let dir = tempdir().expect("create temp dir");
        for name in ["nvidia0", "nvidia1", "nvidiactl", "nvidia-uvm", "null"] {
            File::create(dir.path().join(name)).expect("create file");
        }

        assert_eq!(count_device_nodes(dir.path()), 2);
    }

    #[test]
    fn test_count_device_nodes_missing_dir() {
        assert_eq!(count_device_nodes(Path::new("/no/such/dev")), 0);
    }

    #[test]
    #[serial]
    #[cfg(target_os = "linux")]
    fn test_is_cuda_available_with_mock_library() {
        let dir = tempdir().expect("create temp dir");
        File::create(dir.path().join("libcudart.so.12.0")).expect("create file");

        let original = std::env::var("LD_LIBRARY_PATH").ok();
        unsafe {
            std::env::set_var("LD_LIBRARY_PATH", dir.path().to_str().expect("valid UTF-8"));
        }

        let result = is_cuda_available();

        unsafe {
            match original {
                Some(orig) => std::env::set_var("LD_LIBRARY_PATH", orig),
                None => std::env::remove_var("LD_LIBRARY_PATH"),
            }
        }

        assert!(result, "should detect CUDA runtime in temp directory");
    }
}

//! Error types for flowlens.
//!
//! GPU bootstrap, resource creation and configuration loading can fail.
//! Per-frame problems (a malformed snapshot, a particle with nowhere to
//! respawn) are not errors; they are logged and retried on the next frame.

use std::fmt;

/// Errors that can occur during GPU initialization.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// The surface reports no texture format this adapter can present.
    NoSurfaceFormat,
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::NoSurfaceFormat => write!(f, "The window surface offers no presentable texture format"),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors raised while building or running the render pipelines.
#[derive(Debug)]
pub enum RenderError {
    /// A generated WGSL program or the pipeline built from it was rejected by the device.
    ShaderCompilation {
        /// Label of the program that failed.
        label: String,
        /// Validation message reported by the device.
        message: String,
    },
    /// A texture or buffer was rejected by the device, e.g. larger than its limits.
    ResourceCreation {
        label: String,
        message: String,
    },
    /// A texture format lacks the usages a pass needs on this device.
    UnsupportedFormat {
        /// What the texture was for.
        purpose: &'static str,
        /// The offending format.
        format: wgpu::TextureFormat,
    },
    /// Acquiring or presenting the surface texture failed.
    Surface(wgpu::SurfaceError),
    /// GPU bootstrap failed.
    Gpu(GpuError),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ShaderCompilation { label, message } => {
                write!(f, "Failed to build GPU program '{}': {}", label, message)
            }
            RenderError::ResourceCreation { label, message } => {
                write!(f, "Failed to create GPU resource '{}': {}", label, message)
            }
            RenderError::UnsupportedFormat { purpose, format } => {
                write!(f, "Texture format {:?} cannot be used for {} on this device", format, purpose)
            }
            RenderError::Surface(e) => write!(f, "Surface error: {}", e),
            RenderError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Surface(e) => Some(e),
            RenderError::Gpu(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::SurfaceError> for RenderError {
    fn from(e: wgpu::SurfaceError) -> Self {
        RenderError::Surface(e)
    }
}

impl From<GpuError> for RenderError {
    fn from(e: GpuError) -> Self {
        RenderError::Gpu(e)
    }
}

/// Errors that can occur while loading or saving a [`RenderConfig`](crate::RenderConfig).
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read or write the file.
    Io(std::io::Error),
    /// The file is not valid configuration JSON.
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to access config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Invalid config JSON: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_shader_error_names_program() {
        let err = RenderError::ShaderCompilation {
            label: "Visualize Dye".into(),
            message: "unknown identifier".into(),
        };
        let text = err.to_string();
        assert!(text.contains("Visualize Dye"));
        assert!(text.contains("unknown identifier"));
        assert!(err.source().is_none());
    }

    #[test]
    fn test_config_parse_error_has_source() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ConfigError::from(parse);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Invalid config JSON"));
    }

    #[test]
    fn test_gpu_error_wraps_into_render_error() {
        let err: RenderError = GpuError::NoAdapter.into();
        assert!(matches!(err, RenderError::Gpu(GpuError::NoAdapter)));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_surface_error_converts() {
        let err: RenderError = wgpu::SurfaceError::Lost.into();
        assert!(matches!(err, RenderError::Surface(wgpu::SurfaceError::Lost)));
        assert!(err.source().is_some());
        assert!(GpuError::NoSurfaceFormat.to_string().contains("format"));
    }
}

//! Engine-level error type

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::render::api::GraphicsApi;
use crate::render::vulkan::window::WindowError;
use crate::render::vulkan::VulkanError;

/// Errors surfaced by the public engine API
#[derive(Error, Debug)]
pub enum EngineError {
    /// Backend failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Windowing failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Configuration file could not be loaded or was invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The requested graphics API has no implementation
    #[error("Graphics API {0:?} is not supported")]
    UnsupportedApi(GraphicsApi),
}

impl EngineError {
    /// Programming error on the caller's side (wrong call order, foreign object)
    pub const fn is_usage(&self) -> bool {
        match self {
            Self::Vulkan(e) => e.is_usage(),
            _ => false,
        }
    }

    /// Unreadable or undecodable shader or image file
    pub const fn is_resource_load(&self) -> bool {
        match self {
            Self::Vulkan(e) => e.is_resource_load(),
            _ => false,
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_usage_errors_pass_through() {
        let error: EngineError = VulkanError::invalid_operation("begin called twice").into();
        assert!(error.is_usage());
        assert!(!error.is_resource_load());
    }

    #[test]
    fn test_resource_load_pass_through() {
        let error: EngineError = VulkanError::ResourceLoad {
            path: PathBuf::from("shaders/missing.vert.spv"),
            reason: "not found".to_string(),
        }
        .into();
        assert!(error.is_resource_load());
        assert!(error.to_string().contains("missing.vert.spv"));
    }

    #[test]
    fn test_unsupported_api_is_neither_usage_nor_load() {
        let error = EngineError::UnsupportedApi(GraphicsApi::OpenGl);
        assert!(!error.is_usage());
        assert!(!error.is_resource_load());
        assert!(error.to_string().contains("OpenGl"));
    }
}

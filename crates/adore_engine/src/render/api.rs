//! Backend selection
//!
//! A [`Context`] is created for one [`GraphicsApi`] tag. The tag is matched
//! once here; everything downstream works with the concrete backend.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::config::{ApplicationConfig, EngineConfig};
use crate::core::{EngineError, EngineResult};
use crate::render::vulkan::library::GlfwLibrary;
use crate::render::vulkan::VulkanInstance;

/// Graphics APIs a context can be requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphicsApi {
    /// Vulkan 1.3
    Vulkan,
    /// OpenGL, not implemented
    OpenGl,
}

impl GraphicsApi {
    /// Whether this build can create a context for the API
    pub const fn is_implemented(self) -> bool {
        matches!(self, Self::Vulkan)
    }
}

/// The single concrete backend behind a context
pub enum ContextBackend {
    /// Vulkan instance and its GLFW library reference
    Vulkan(Arc<VulkanInstance>),
}

/// Connection to the GPU driver; every other object is created from it
pub struct Context {
    api: GraphicsApi,
    backend: ContextBackend,
}

impl Context {
    /// Create a context for `api` with default settings
    pub fn new(api: GraphicsApi, app_name: &str) -> EngineResult<Self> {
        Self::with_application(api, &ApplicationConfig::new(app_name), cfg!(debug_assertions))
    }

    /// Create a context from a full engine configuration
    pub fn from_config(api: GraphicsApi, config: &EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(|reason| {
            log::error!("Rejected engine configuration: {reason}");
            EngineError::Config(crate::core::config::ConfigError::Invalid(reason))
        })?;
        Self::with_application(api, &config.application, config.renderer.validation_enabled())
    }

    fn with_application(api: GraphicsApi, app: &ApplicationConfig, enable_validation: bool) -> EngineResult<Self> {
        let backend = match api {
            GraphicsApi::Vulkan => {
                let library = GlfwLibrary::acquire()?;
                let instance = VulkanInstance::new(library, app, enable_validation).map_err(|e| {
                    log::error!("Context creation failed: {e}");
                    e
                })?;
                ContextBackend::Vulkan(Arc::new(instance))
            }
            GraphicsApi::OpenGl => {
                log::error!("Requested graphics API {api:?} is not implemented");
                return Err(EngineError::UnsupportedApi(api));
            }
        };

        log::info!("Created {api:?} context for '{}'", app.name);
        Ok(Self { api, backend })
    }

    /// API tag this context was created for
    pub const fn api(&self) -> GraphicsApi {
        self.api
    }

    /// Concrete backend
    pub const fn backend(&self) -> &ContextBackend {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_vulkan_is_implemented() {
        assert!(GraphicsApi::Vulkan.is_implemented());
        assert!(!GraphicsApi::OpenGl.is_implemented());
    }

    #[test]
    fn test_opengl_context_is_unsupported() {
        let result = Context::new(GraphicsApi::OpenGl, "TestApp");
        assert!(matches!(result, Err(EngineError::UnsupportedApi(GraphicsApi::OpenGl))));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_any_driver_call() {
        let mut config = EngineConfig::new("TestApp");
        config.renderer.frames_in_flight = 0;
        let result = Context::from_config(GraphicsApi::Vulkan, &config);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_api_tag_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            api: GraphicsApi,
        }
        let doc: Doc = toml::from_str("api = \"Vulkan\"").unwrap();
        assert_eq!(doc.api, GraphicsApi::Vulkan);
    }
}

//! Process-wide GLFW lifetime
//!
//! Every [`GlfwLibrary`] holds a `glfw::Glfw`, which counts its own live
//! handles: GLFW is initialized by the first one and terminated when the
//! last clone drops. Each live `Context` holds one, so the library lives
//! exactly as long as some context or window does. GLFW requires both calls
//! to happen on the main thread.

use super::{VulkanError, VulkanResult};

fn log_glfw_error(error: glfw::Error, description: String) {
    log::error!("[GLFW] {error:?}: {description}");
}

/// One reference to the initialized GLFW library
pub struct GlfwLibrary {
    glfw: glfw::Glfw,
}

impl GlfwLibrary {
    /// Initialize GLFW if no handle is live yet, and check Vulkan support
    pub fn acquire() -> VulkanResult<Self> {
        let glfw = glfw::init(log_glfw_error)
            .map_err(|e| VulkanError::InitializationFailed(format!("GLFW initialization failed: {e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(VulkanError::InitializationFailed(
                "GLFW reports no Vulkan loader on this system".to_string(),
            ));
        }

        log::debug!("Acquired GLFW handle");
        Ok(Self { glfw })
    }

    /// Borrow the GLFW handle
    pub fn glfw(&self) -> &glfw::Glfw {
        &self.glfw
    }

    /// Instance extensions GLFW needs to create surfaces
    pub fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw.get_required_instance_extensions().ok_or_else(|| {
            VulkanError::InitializationFailed("GLFW could not report required instance extensions".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires a Vulkan driver and a display"]
    fn test_dropping_one_handle_keeps_the_other_usable() {
        let first = GlfwLibrary::acquire().unwrap();
        let second = GlfwLibrary::acquire().unwrap();
        drop(first);

        assert!(second.glfw().vulkan_supported());
        assert!(!second.required_instance_extensions().unwrap().is_empty());

        drop(second);
        let again = GlfwLibrary::acquire().unwrap();
        assert!(again.glfw().vulkan_supported());
    }
}

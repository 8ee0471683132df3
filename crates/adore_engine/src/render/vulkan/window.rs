//! Window management using GLFW
//!
//! A [`Window`] is the presentation target: the GLFW window, its Vulkan
//! surface, the logical device chosen for that surface, the presentation
//! render pass and the current swapchain.

use ash::vk;
use std::sync::Arc;
use thiserror::Error;

use super::context::{drained, logged};
use super::render_pass::RenderPass;
use super::swapchain::{SurfaceSupport, Swapchain};
use super::{LogicalDevice, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult};
use crate::core::config::WindowConfig;
use crate::render::api::{Context, ContextBackend};
use crate::render::ownership::OwnerId;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not create the native window
    #[error("Window creation failed: {0}")]
    CreationFailed(String),

    /// GLFW could not create a Vulkan surface for the window
    #[error("Surface creation failed: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// GLFW takes sizes as `i32`; larger requests clamp instead of wrapping negative
fn glfw_dimension(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// GLFW window with its Vulkan surface, device and swapchain
pub struct Window {
    id: OwnerId,
    swapchain: Option<Swapchain>,
    render_pass: Option<RenderPass>,
    support: SurfaceSupport,
    surface: vk::SurfaceKHR,
    device: Arc<LogicalDevice>,
    vsync: bool,
    framebuffer_resized: bool,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    window: glfw::PWindow,
    glfw: glfw::Glfw,
    instance: Arc<VulkanInstance>,
}

impl Window {
    /// Create the window, its surface, device, render pass and first swapchain
    pub fn new(context: &Context, config: &WindowConfig) -> VulkanResult<Self> {
        let instance = match context.backend() {
            ContextBackend::Vulkan(instance) => Arc::clone(instance),
        };
        logged(Self::create(instance, config), "Window creation failed")
    }

    fn create(instance: Arc<VulkanInstance>, config: &WindowConfig) -> VulkanResult<Self> {
        config.validate().map_err(VulkanError::InitializationFailed)?;

        let mut glfw = instance.library().glfw().clone();
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or_else(|| WindowError::CreationFailed(config.title.clone()))?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_size_polling(true);
        window.set_framebuffer_size_polling(true);

        let mut surface = vk::SurfaceKHR::null();
        let result = window.create_window_surface(instance.instance().handle(), std::ptr::null(), &mut surface);
        if result != vk::Result::SUCCESS {
            return Err(WindowError::SurfaceCreation(result).into());
        }

        let device = PhysicalDeviceInfo::select_suitable_device(&instance, surface)
            .and_then(|physical| LogicalDevice::new(Arc::clone(&instance), physical))
            .map(Arc::new);
        let device = match device {
            Ok(device) => device,
            Err(e) => {
                unsafe { instance.surface_loader().destroy_surface(surface, None) };
                return Err(e);
            }
        };

        // Surface is owned by Window from here, so Drop releases it on error.
        let mut this = Self {
            id: OwnerId::next(),
            swapchain: None,
            render_pass: None,
            support: SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: Vec::new(),
                present_modes: Vec::new(),
            },
            surface,
            device,
            vsync: config.vsync,
            framebuffer_resized: false,
            events,
            window,
            glfw,
            instance,
        };

        this.support = SurfaceSupport::query(&this.instance, this.device.physical().device, surface)?;
        let format = super::swapchain::choose_surface_format(&this.support.formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface has no formats".to_string()))?;
        this.render_pass = Some(RenderPass::new_present_pass(Arc::clone(&this.device), format.format)?);
        this.build_swapchain()?;

        log::info!("Created window '{}' ({})", config.title, this.id);
        Ok(this)
    }

    fn build_swapchain(&mut self) -> VulkanResult<()> {
        let render_pass = self
            .render_pass
            .as_ref()
            .ok_or_else(|| VulkanError::invalid_operation("Window has no render pass"))?;
        let old = self.swapchain.as_ref().map_or(vk::SwapchainKHR::null(), Swapchain::handle);

        let swapchain = Swapchain::new(
            Arc::clone(&self.device),
            self.surface,
            &self.support,
            render_pass,
            self.framebuffer_size(),
            self.vsync,
            old,
        )?;
        // Retiring the old chain only after the new one exists
        self.swapchain = Some(swapchain);
        Ok(())
    }

    /// Rebuild the swapchain for the current framebuffer size
    ///
    /// Blocks while the framebuffer is zero sized (minimized), then waits for
    /// the device to go idle before the old images are released.
    pub fn recreate_swapchain(&mut self) -> VulkanResult<()> {
        let mut size = self.framebuffer_size();
        while size.0 == 0 || size.1 == 0 {
            if self.window.should_close() {
                log::debug!("Window closing while minimized, skipping swapchain rebuild");
                return Ok(());
            }
            self.glfw.wait_events();
            size = self.framebuffer_size();
        }

        self.device.wait_idle()?;
        self.support
            .refresh_capabilities(&self.instance, self.device.physical().device, self.surface)?;
        logged(self.build_swapchain(), "Swapchain recreation failed")?;
        self.framebuffer_resized = false;

        log::info!("Recreated swapchain at {}x{}", size.0, size.1);
        Ok(())
    }

    /// Identity used to check that shaders target this window
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Request a new size; the swapchain follows on the next stale report
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window.set_size(glfw_dimension(width), glfw_dimension(height));
        self.framebuffer_resized = true;
    }

    /// Ask the window to close
    pub fn close(&mut self) {
        self.window.set_should_close(true);
    }

    /// Whether the window has not been asked to close
    pub fn is_open(&self) -> bool {
        !self.window.should_close()
    }

    /// Poll GLFW and return this window's events
    pub fn poll(&mut self) -> Vec<glfw::WindowEvent> {
        self.glfw.poll_events();
        let events: Vec<glfw::WindowEvent> = glfw::flush_messages(&self.events).map(|(_, event)| event).collect();
        if events
            .iter()
            .any(|event| matches!(event, glfw::WindowEvent::FramebufferSize(..)))
        {
            self.framebuffer_resized = true;
        }
        events
    }

    /// Current framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (u32::try_from(width).unwrap_or(0), u32::try_from(height).unwrap_or(0))
    }

    /// Whether a resize was observed since the last swapchain rebuild
    pub fn was_resized(&self) -> bool {
        self.framebuffer_resized
    }

    /// Extent of the current swapchain
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.as_ref().map_or(vk::Extent2D::default(), Swapchain::extent)
    }

    /// The current swapchain
    pub fn swapchain(&self) -> VulkanResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| VulkanError::invalid_operation("Window has no swapchain"))
    }

    /// The presentation render pass
    pub fn render_pass(&self) -> VulkanResult<&RenderPass> {
        self.render_pass
            .as_ref()
            .ok_or_else(|| VulkanError::invalid_operation("Window has no render pass"))
    }

    /// Logical device serving this window
    pub fn device(&self) -> &Arc<LogicalDevice> {
        &self.device
    }

    /// Cached surface support
    pub fn surface_support(&self) -> &SurfaceSupport {
        &self.support
    }

    /// Raw GLFW window, for input queries
    pub fn glfw_window(&self) -> &glfw::PWindow {
        &self.window
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        drained(self.device.wait_idle(), "window");
        self.swapchain = None;
        self.render_pass = None;
        unsafe {
            self.instance.surface_loader().destroy_surface(self.surface, None);
        }
        log::debug!("Destroyed window {}", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_dimensions_clamp_to_i32_max() {
        assert_eq!(glfw_dimension(640), 640);
        assert_eq!(glfw_dimension(i32::MAX as u32), i32::MAX);
        assert_eq!(glfw_dimension(i32::MAX as u32 + 1), i32::MAX);
        assert_eq!(glfw_dimension(u32::MAX), i32::MAX);
    }
}

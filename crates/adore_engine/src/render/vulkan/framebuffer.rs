//! Framebuffer management

use ash::vk;
use std::sync::Arc;

use super::{LogicalDevice, VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Arc<LogicalDevice>,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: Arc<LogicalDevice>,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_framebuffer(self.framebuffer, None);
        }
    }
}

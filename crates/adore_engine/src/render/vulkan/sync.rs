//! Synchronization primitives
//!
//! RAII semaphores and fences, and the per-slot [`FrameSync`] set used by
//! the renderer's frames-in-flight ring.

use ash::vk;
use std::sync::Arc;

use super::{LogicalDevice, VulkanError, VulkanResult};

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Arc<LogicalDevice>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Arc<LogicalDevice>) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None) }
            .map_err(VulkanError::Api)?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Arc<LogicalDevice>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(device: Arc<LogicalDevice>, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, fence })
    }

    /// Block until the fence is signaled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.handle().wait_for_fences(&[self.fence], true, timeout) }.map_err(VulkanError::Api)
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence]) }.map_err(VulkanError::Api)
    }

    /// Whether the fence is currently signaled
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe { self.device.handle().get_fence_status(self.fence) }.map_err(VulkanError::Api)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization set for one frame-in-flight slot
pub struct FrameSync {
    /// Signaled when the acquired swapchain image may be written
    pub image_available: Semaphore,
    /// Signaled when the slot's commands finished, gates presentation
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completed on the GPU
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create a slot whose fence starts signaled, so the first wait passes
    pub fn new(device: &Arc<LogicalDevice>) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(Arc::clone(device))?,
            render_finished: Semaphore::new(Arc::clone(device))?,
            in_flight: Fence::new(Arc::clone(device), true)?,
        })
    }
}

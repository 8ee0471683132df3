//! Command pool management
//!
//! Per-frame command buffers are allocated once from a resettable pool.
//! One-shot transfer work (staged uploads, layout transitions) goes through
//! [`CommandPool::submit_single_time`], which blocks until the queue is idle.

use ash::{vk, Device};
use std::sync::Arc;

use super::context::drained;
use super::{LogicalDevice, VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Arc<LogicalDevice>,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Arc<LogicalDevice>, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool =
            unsafe { device.handle().create_command_pool(&pool_create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.handle().allocate_command_buffers(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Record `record` into a fresh command buffer, submit it and wait
    ///
    /// Synchronous: when this returns the work has completed on `queue`.
    pub fn submit_single_time<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let device = self.device.handle();
        let command_buffer = self
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("No command buffer allocated".to_string()))?;

        let result = (|| {
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { device.begin_command_buffer(command_buffer, &begin_info) }.map_err(VulkanError::Api)?;

            record(device, command_buffer);

            unsafe { device.end_command_buffer(command_buffer) }.map_err(VulkanError::Api)?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
            unsafe {
                device
                    .queue_submit(queue, &[submit_info], vk::Fence::null())
                    .map_err(VulkanError::Api)?;
                device.queue_wait_idle(queue).map_err(VulkanError::Api)
            }
        })();

        unsafe { device.free_command_buffers(self.command_pool, &[command_buffer]) };
        result
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Device the pool was created on
    pub fn device(&self) -> &Arc<LogicalDevice> {
        &self.device
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        drained(self.device.wait_idle(), "command pool");
        unsafe {
            // Frees every command buffer allocated from it
            self.device.handle().destroy_command_pool(self.command_pool, None);
        }
    }
}

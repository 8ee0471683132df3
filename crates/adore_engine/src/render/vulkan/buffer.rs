//! Buffer management for vertex and index data
//!
//! Vertex and index buffers live in device-local memory and are filled once
//! through a staging buffer. Construction blocks until the copy has finished,
//! so a returned buffer is always fully populated.

use ash::vk;
use std::sync::Arc;

use super::commands::CommandPool;
use super::context::drained;
use super::renderer::Renderer;
use super::{LogicalDevice, VulkanError, VulkanResult};
use crate::render::ownership::OwnerId;

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Arc<LogicalDevice>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        device: Arc<LogicalDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::invalid_operation("Cannot create a zero-sized buffer"));
        }

        let raw = device.handle();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { raw.create_buffer(&buffer_info, None) }.map_err(VulkanError::Api)?;

        let mem_requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let memory = device
            .find_memory_type(mem_requirements.memory_type_bits, properties)
            .and_then(|memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(mem_requirements.size)
                    .memory_type_index(memory_type_index);
                unsafe { raw.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { raw.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { raw.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                raw.destroy_buffer(buffer, None);
                raw.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Create a device-local buffer holding `bytes`, uploaded through a staging buffer
    pub fn new_device_local(
        device: Arc<LogicalDevice>,
        pool: &CommandPool,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let size = bytes.len() as vk::DeviceSize;

        let staging = Self::new(
            Arc::clone(&device),
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(bytes)?;

        // TRANSFER_SRC so the contents can be read back for verification
        let buffer = Self::new(
            Arc::clone(&device),
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        copy_buffer(pool, device.graphics_queue(), &staging, &buffer, size)?;
        Ok(buffer)
    }

    /// Map the whole allocation; the memory must be host visible
    pub fn map_memory(&self) -> VulkanResult<*mut std::ffi::c_void> {
        unsafe {
            self.device
                .handle()
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    /// Unmap memory
    pub fn unmap_memory(&self) {
        unsafe {
            self.device.handle().unmap_memory(self.memory);
        }
    }

    /// Copy `bytes` to the start of a host-visible buffer
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::invalid_operation(format!(
                "Write of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.size
            )));
        }

        let data_ptr = self.map_memory()?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data_ptr.cast::<u8>(), bytes.len());
        }
        self.unmap_memory();
        Ok(())
    }

    /// Copy the contents of a host-visible buffer out
    pub fn read_bytes(&self) -> VulkanResult<Vec<u8>> {
        let mut bytes = vec![0u8; self.size as usize];
        let data_ptr = self.map_memory()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data_ptr.cast::<u8>().cast_const(), bytes.as_mut_ptr(), bytes.len());
        }
        self.unmap_memory();
        Ok(bytes)
    }

    /// Copy the contents of any buffer out through a staging buffer
    pub fn read_back(&self, pool: &CommandPool) -> VulkanResult<Vec<u8>> {
        let staging = Self::new(
            Arc::clone(&self.device),
            self.size,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        copy_buffer(pool, self.device.graphics_queue(), self, &staging, self.size)?;
        staging.read_bytes()
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
    }
}

fn copy_buffer(
    pool: &CommandPool,
    queue: vk::Queue,
    src: &Buffer,
    dst: &Buffer,
    size: vk::DeviceSize,
) -> VulkanResult<()> {
    pool.submit_single_time(queue, |device, command_buffer| {
        let region = vk::BufferCopy::builder().size(size).build();
        unsafe {
            device.cmd_copy_buffer(command_buffer, src.handle(), dst.handle(), &[region]);
        }
    })
}

/// Immutable device-local vertex data
pub struct VertexBuffer {
    buffer: Buffer,
    owner: OwnerId,
}

impl VertexBuffer {
    /// Upload `vertices` into a new vertex buffer owned by `renderer`
    pub fn new<T: bytemuck::Pod>(renderer: &Renderer, vertices: &[T]) -> VulkanResult<Self> {
        Self::from_bytes(renderer, bytemuck::cast_slice(vertices))
    }

    /// Upload raw bytes into a new vertex buffer owned by `renderer`
    pub fn from_bytes(renderer: &Renderer, bytes: &[u8]) -> VulkanResult<Self> {
        let buffer = Buffer::new_device_local(
            Arc::clone(renderer.device()),
            renderer.command_pool(),
            bytes,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        );
        let buffer = super::context::logged(buffer, "Vertex buffer creation failed")?;
        log::debug!("Created vertex buffer of {} bytes for renderer {}", bytes.len(), renderer.id());

        Ok(Self {
            buffer,
            owner: renderer.id(),
        })
    }

    /// Read the GPU contents back
    pub fn read_back(&self, renderer: &Renderer) -> VulkanResult<Vec<u8>> {
        renderer.id().ensure_owns("VertexBuffer", self.owner)?;
        self.buffer.read_back(renderer.command_pool())
    }

    /// Renderer this buffer was created against
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        // An in-flight frame may still read from it
        drained(self.buffer.device.wait_graphics_idle(), "vertex buffer");
    }
}

/// Immutable device-local `u32` index data
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
    owner: OwnerId,
}

impl IndexBuffer {
    /// Upload `indices` into a new index buffer owned by `renderer`
    pub fn new(renderer: &Renderer, indices: &[u32]) -> VulkanResult<Self> {
        let buffer = Buffer::new_device_local(
            Arc::clone(renderer.device()),
            renderer.command_pool(),
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        );
        let buffer = super::context::logged(buffer, "Index buffer creation failed")?;
        log::debug!("Created index buffer of {} indices for renderer {}", indices.len(), renderer.id());

        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
            owner: renderer.id(),
        })
    }

    /// Read the GPU contents back
    pub fn read_back(&self, renderer: &Renderer) -> VulkanResult<Vec<u8>> {
        renderer.id().ensure_owns("IndexBuffer", self.owner)?;
        self.buffer.read_back(renderer.command_pool())
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Index element type
    pub fn index_type(&self) -> vk::IndexType {
        vk::IndexType::UINT32
    }

    /// Renderer this buffer was created against
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        drained(self.buffer.device.wait_graphics_idle(), "index buffer");
    }
}

//! Per-frame uniform buffers
//!
//! A uniform buffer keeps one persistently mapped host-visible allocation per
//! frame slot and one host-side shadow copy. `set` only touches the shadow
//! copy and marks every slot dirty; a slot is brought up to date when the
//! renderer begins a frame on it, so the GPU never sees a half-written value
//! that an in-flight frame is still reading.

use ash::vk;
use std::sync::Arc;

use super::buffer::Buffer;
use super::{LogicalDevice, VulkanError, VulkanResult};
use crate::render::ownership::OwnerId;

slotmap::new_key_type! {
    /// Arena key for uniform buffers inside a renderer
    pub struct UniformBufferKey;
}

/// Handle to a uniform buffer living in a renderer's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformBufferHandle {
    pub(crate) key: UniformBufferKey,
    pub(crate) owner: OwnerId,
}

impl UniformBufferHandle {
    /// Renderer the buffer belongs to
    pub fn owner(&self) -> OwnerId {
        self.owner
    }
}

/// Host copy of uniform data with one dirty flag per frame slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowCopy {
    data: Vec<u8>,
    dirty: Vec<bool>,
}

impl ShadowCopy {
    /// Shadow copy for `slots` frame slots, all clean
    pub fn new(data: &[u8], slots: usize) -> Self {
        Self {
            data: data.to_vec(),
            dirty: vec![false; slots],
        }
    }

    /// Replace the data and mark every slot dirty
    ///
    /// Slots are marked even when the bytes are unchanged.
    pub fn set(&mut self, data: &[u8]) -> VulkanResult<()> {
        if data.len() != self.data.len() {
            return Err(VulkanError::invalid_operation(format!(
                "Uniform data is {} bytes, buffer holds {}",
                data.len(),
                self.data.len()
            )));
        }
        self.data.copy_from_slice(data);
        self.dirty.fill(true);
        Ok(())
    }

    /// Hand the data to `write` if `slot` is dirty, then mark it clean
    ///
    /// Returns whether anything was written.
    pub fn flush(&mut self, slot: usize, write: impl FnOnce(&[u8])) -> bool {
        match self.dirty.get_mut(slot) {
            Some(dirty) if *dirty => {
                write(&self.data);
                *dirty = false;
                true
            }
            _ => false,
        }
    }

    /// Whether `slot` still holds stale data
    pub fn is_dirty(&self, slot: usize) -> bool {
        self.dirty.get(slot).copied().unwrap_or(false)
    }

    /// Current host data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of frame slots tracked
    pub fn slot_count(&self) -> usize {
        self.dirty.len()
    }
}

struct MappedSlot {
    buffer: Buffer,
    mapped: *mut u8,
}

/// Uniform buffer with one mapped allocation per frame slot
pub struct UniformBuffer {
    shadow: ShadowCopy,
    slots: Vec<MappedSlot>,
}

impl UniformBuffer {
    /// Allocate `frames` mapped buffers, each initialised with `data`
    pub(crate) fn new(device: &Arc<LogicalDevice>, frames: usize, data: &[u8]) -> VulkanResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let mut slots = Vec::with_capacity(frames);

        for _ in 0..frames {
            let buffer = Buffer::new(
                Arc::clone(device),
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            // Stays mapped until the buffer's memory is freed
            let mapped = buffer.map_memory()?.cast::<u8>();
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
            }
            slots.push(MappedSlot { buffer, mapped });
        }

        Ok(Self {
            shadow: ShadowCopy::new(data, frames),
            slots,
        })
    }

    /// Replace the contents; slots pick it up at their next frame
    pub fn set(&mut self, data: &[u8]) -> VulkanResult<()> {
        self.shadow.set(data)
    }

    /// Typed form of [`UniformBuffer::set`]
    pub fn set_typed<T: bytemuck::Pod>(&mut self, value: &T) -> VulkanResult<()> {
        self.set(bytemuck::bytes_of(value))
    }

    /// Copy the shadow data into `slot` if it is dirty
    pub fn update(&mut self, slot: usize) -> bool {
        let Some(target) = self.slots.get(slot) else {
            return false;
        };
        let mapped = target.mapped;
        self.shadow.flush(slot, |data| unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
        })
    }

    /// Whether `slot` has not received the latest `set`
    pub fn is_dirty(&self, slot: usize) -> bool {
        self.shadow.is_dirty(slot)
    }

    /// Size of the uniform data in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.shadow.data().len() as vk::DeviceSize
    }

    /// Descriptor info pointing at `slot`'s allocation
    pub fn descriptor_info(&self, slot: usize) -> Option<vk::DescriptorBufferInfo> {
        self.slots.get(slot).map(|target| vk::DescriptorBufferInfo {
            buffer: target.buffer.handle(),
            offset: 0,
            range: self.size(),
        })
    }

    /// Current bytes visible to the GPU in `slot`
    pub fn slot_contents(&self, slot: usize) -> Option<Vec<u8>> {
        self.slots.get(slot).map(|target| {
            let len = self.shadow.data().len();
            unsafe { std::slice::from_raw_parts(target.mapped.cast_const(), len) }.to_vec()
        })
    }

    /// Number of frame slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.buffer.unmap_memory();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_shadow_is_clean() {
        let shadow = ShadowCopy::new(&[1, 2, 3, 4], 2);
        assert!(!shadow.is_dirty(0));
        assert!(!shadow.is_dirty(1));
        assert_eq!(shadow.slot_count(), 2);
    }

    #[test]
    fn test_set_marks_every_slot_dirty() {
        let mut shadow = ShadowCopy::new(&[0; 4], 3);
        shadow.set(&[9; 4]).unwrap();
        assert!((0..3).all(|slot| shadow.is_dirty(slot)));
    }

    #[test]
    fn test_identical_set_still_marks_dirty() {
        let mut shadow = ShadowCopy::new(&[5; 4], 2);
        shadow.set(&[5; 4]).unwrap();
        assert!(shadow.is_dirty(0));
        assert!(shadow.is_dirty(1));
    }

    #[test]
    fn test_flush_last_write_wins_and_clears_only_that_slot() {
        let mut shadow = ShadowCopy::new(&[0; 4], 2);
        shadow.set(&[1; 4]).unwrap();
        shadow.set(&[2; 4]).unwrap();
        shadow.set(&[3; 4]).unwrap();

        let mut gpu = [0u8; 4];
        assert!(shadow.flush(1, |data| gpu.copy_from_slice(data)));
        assert_eq!(gpu, [3; 4]);
        assert!(!shadow.is_dirty(1));
        assert!(shadow.is_dirty(0));
    }

    #[test]
    fn test_flush_clean_slot_is_noop() {
        let mut shadow = ShadowCopy::new(&[7; 4], 2);
        let mut called = false;
        assert!(!shadow.flush(0, |_| called = true));
        assert!(!called);
    }

    #[test]
    fn test_flush_out_of_range_slot() {
        let mut shadow = ShadowCopy::new(&[7; 4], 2);
        shadow.set(&[8; 4]).unwrap();
        assert!(!shadow.flush(5, |_| panic!("must not write")));
        assert!(!shadow.is_dirty(5));
    }

    #[test]
    fn test_size_mismatch_is_usage_error() {
        let mut shadow = ShadowCopy::new(&[0; 16], 2);
        let err = shadow.set(&[0; 8]).unwrap_err();
        assert!(err.is_usage());
        assert!(!shadow.is_dirty(0));
        assert_eq!(shadow.data(), &[0; 16]);
    }
}

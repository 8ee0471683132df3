//! Descriptor set layouts, pools and writes
//!
//! A shader owns one layout built from its [`LayoutDescriptor`] resources,
//! one pool sized for exactly one set per frame slot, and the sets themselves.

use ash::vk;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::vertex_layout::{vk_descriptor_type, vk_stage};
use super::{LogicalDevice, VulkanError, VulkanResult};
use crate::render::layout::LayoutDescriptor;

/// Layout bindings for a descriptor's resources
pub fn layout_bindings(layout: &LayoutDescriptor) -> Vec<vk::DescriptorSetLayoutBinding> {
    layout
        .resources
        .iter()
        .map(|resource| {
            vk::DescriptorSetLayoutBinding::builder()
                .binding(resource.binding)
                .descriptor_type(vk_descriptor_type(resource.kind))
                .descriptor_count(resource.count)
                .stage_flags(vk_stage(resource.stage))
                .build()
        })
        .collect()
}

/// Pool sizes for `sets` copies of the descriptor's resources
pub fn pool_sizes(layout: &LayoutDescriptor, sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut per_type: BTreeMap<i32, u32> = BTreeMap::new();
    for resource in &layout.resources {
        let total = per_type.entry(vk_descriptor_type(resource.kind).as_raw()).or_default();
        *total = total.saturating_add(resource.count);
    }

    per_type
        .into_iter()
        .map(|(ty, count)| vk::DescriptorPoolSize {
            ty: vk::DescriptorType::from_raw(ty),
            descriptor_count: count.saturating_mul(sets),
        })
        .collect()
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    device: Arc<LogicalDevice>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Build the layout for a descriptor's resources
    pub fn new(device: Arc<LogicalDevice>, layout: &LayoutDescriptor) -> VulkanResult<Self> {
        let bindings = layout_bindings(layout);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let layout = unsafe { device.handle().create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(Self { device, layout })
    }

    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool for a fixed number of identical sets
pub struct DescriptorPool {
    device: Arc<LogicalDevice>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool holding `sets` sets of `layout`'s resources
    pub fn new(device: Arc<LogicalDevice>, layout: &LayoutDescriptor, sets: u32) -> VulkanResult<Self> {
        let sizes = pool_sizes(layout, sets);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(sets)
            .pool_sizes(&sizes);

        let pool =
            unsafe { device.handle().create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self { device, pool })
    }

    /// Allocate one set per entry in `layouts`
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            // Frees every set allocated from it
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum PendingInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    info: PendingInfo,
}

/// Batches descriptor writes and applies them in one call
///
/// Infos are collected first and the `WriteDescriptorSet` structs are built
/// in [`DescriptorSetWriter::update`], so their pointers stay valid.
#[derive(Default)]
pub struct DescriptorSetWriter {
    pending: Vec<PendingWrite>,
}

impl DescriptorSetWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `binding` of `set` at a uniform buffer
    pub fn write_buffer(mut self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        self.pending.push(PendingWrite {
            set,
            binding,
            info: PendingInfo::Buffer(info),
        });
        self
    }

    /// Point `binding` of `set` at a combined image sampler
    pub fn write_image(mut self, set: vk::DescriptorSet, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.pending.push(PendingWrite {
            set,
            binding,
            info: PendingInfo::Image(info),
        });
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no writes are queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every queued write
    pub fn update(self, device: &LogicalDevice) {
        if self.pending.is_empty() {
            return;
        }

        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|write| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(write.set)
                    .dst_binding(write.binding)
                    .dst_array_element(0);
                match &write.info {
                    PendingInfo::Buffer(info) => builder
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(std::slice::from_ref(info))
                        .build(),
                    PendingInfo::Image(info) => builder
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(info))
                        .build(),
                }
            })
            .collect();

        unsafe {
            device.handle().update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::layout::{ResourceBinding, ResourceKind, ShaderStage};

    fn textured_layout() -> LayoutDescriptor {
        LayoutDescriptor::new()
            .with_resource(0, ShaderStage::Vertex, ResourceKind::Buffer)
            .with_resource(1, ShaderStage::Fragment, ResourceKind::Sampler)
            .with_resource(2, ShaderStage::Fragment, ResourceKind::Buffer)
    }

    #[test]
    fn test_layout_bindings_follow_resources() {
        let bindings = layout_bindings(&textured_layout());
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(bindings[1].descriptor_count, 1);
    }

    #[test]
    fn test_pool_sizes_scale_with_frames() {
        let sizes = pool_sizes(&textured_layout(), 3);
        let count_of = |ty: vk::DescriptorType| {
            sizes
                .iter()
                .find(|size| size.ty == ty)
                .map(|size| size.descriptor_count)
        };
        assert_eq!(sizes.len(), 2);
        assert_eq!(count_of(vk::DescriptorType::UNIFORM_BUFFER), Some(6));
        assert_eq!(count_of(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), Some(3));
    }

    #[test]
    fn test_pool_sizes_saturate_on_huge_counts() {
        let mut layout = LayoutDescriptor::new();
        for binding in 0..2 {
            layout.resources.push(ResourceBinding {
                binding,
                count: u32::MAX,
                stage: ShaderStage::Fragment,
                kind: ResourceKind::Sampler,
            });
        }
        let sizes = pool_sizes(&layout, 3);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].descriptor_count, u32::MAX);
    }

    #[test]
    fn test_empty_layout_needs_no_pool_sizes() {
        assert!(pool_sizes(&LayoutDescriptor::new(), 2).is_empty());
    }

    #[test]
    fn test_writer_queues_writes() {
        let writer = DescriptorSetWriter::new()
            .write_buffer(vk::DescriptorSet::null(), 0, vk::DescriptorBufferInfo::default())
            .write_image(vk::DescriptorSet::null(), 1, vk::DescriptorImageInfo::default());
        assert_eq!(writer.len(), 2);
        assert!(!writer.is_empty());
    }
}

//! Textures and samplers
//!
//! Image files are decoded to RGBA8 on the CPU first, so an unreadable path
//! fails before any device memory is touched. The pixels are then staged into
//! a device-local `R8G8B8A8_SRGB` image: UNDEFINED to TRANSFER_DST, buffer
//! copy, TRANSFER_DST to SHADER_READ_ONLY.

use ash::vk;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::buffer::Buffer;
use super::commands::CommandPool;
use super::{LogicalDevice, VulkanError, VulkanResult};
use crate::render::ownership::OwnerId;

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Texel filtering for magnification and minification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Filter {
    /// Bilinear filtering
    #[default]
    Linear,
    /// Nearest texel
    Nearest,
}

impl Filter {
    /// Native filter
    pub const fn to_vk(self) -> vk::Filter {
        match self {
            Self::Linear => vk::Filter::LINEAR,
            Self::Nearest => vk::Filter::NEAREST,
        }
    }

    /// Native mipmap mode matching the filter
    pub const fn mipmap_mode(self) -> vk::SamplerMipmapMode {
        match self {
            Self::Linear => vk::SamplerMipmapMode::LINEAR,
            Self::Nearest => vk::SamplerMipmapMode::NEAREST,
        }
    }
}

/// Addressing outside the [0, 1] texture coordinate range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Wrap {
    /// Tile the texture
    #[default]
    Repeat,
    /// Tile, mirroring every other repetition
    MirroredRepeat,
    /// Clamp to the edge texels
    ClampToEdge,
    /// Clamp to a transparent black border
    ClampToBorder,
}

impl Wrap {
    /// Native address mode
    pub const fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            Self::Repeat => vk::SamplerAddressMode::REPEAT,
            Self::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            Self::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            Self::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }
}

/// RGBA8 pixels decoded from an image file
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Tightly packed RGBA8 rows
    pub pixels: Vec<u8>,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
}

impl DecodedImage {
    /// Decode an image file, converting it to RGBA8
    pub fn load(path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| VulkanError::ResourceLoad {
            path: PathBuf::from(path),
            reason: e.to_string(),
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }
}

/// Access masks and pipeline stages for a supported layout transition
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Option<(vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Some((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Some((
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        )),
        _ => None,
    }
}

fn transition_layout(
    pool: &CommandPool,
    queue: vk::Queue,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> VulkanResult<()> {
    let (src_access, dst_access, src_stage, dst_stage) = transition_masks(old_layout, new_layout)
        .ok_or_else(|| {
            VulkanError::invalid_operation(format!("Unsupported layout transition {old_layout:?} -> {new_layout:?}"))
        })?;

    pool.submit_single_time(queue, |device, command_buffer| {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource_range())
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    })
}

fn copy_buffer_to_image(
    pool: &CommandPool,
    queue: vk::Queue,
    buffer: &Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) -> VulkanResult<()> {
    pool.submit_single_time(queue, |device, command_buffer| {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .build();

        unsafe {
            device.cmd_copy_buffer_to_image(
                command_buffer,
                buffer.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    })
}

const fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Device-local sampled image
pub struct Texture {
    device: Arc<LogicalDevice>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    extent: vk::Extent2D,
}

impl Texture {
    /// Upload decoded pixels into a new device image
    pub fn from_decoded(device: Arc<LogicalDevice>, pool: &CommandPool, decoded: &DecodedImage) -> VulkanResult<Self> {
        let extent = vk::Extent2D {
            width: decoded.width,
            height: decoded.height,
        };

        let staging = Buffer::new(
            Arc::clone(&device),
            decoded.pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(&decoded.pixels)?;

        let raw = device.handle();
        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(TEXTURE_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { raw.create_image(&image_create_info, None) }.map_err(VulkanError::Api)?;

        // Owned from here, so every later failure releases through Drop
        let mut texture = Self {
            image,
            memory: vk::DeviceMemory::null(),
            image_view: vk::ImageView::null(),
            extent,
            device: Arc::clone(&device),
        };

        let requirements = unsafe { raw.get_image_memory_requirements(image) };
        let memory_type_index =
            device.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        texture.memory = unsafe { raw.allocate_memory(&alloc_info, None) }.map_err(VulkanError::Api)?;
        unsafe { raw.bind_image_memory(image, texture.memory, 0) }.map_err(VulkanError::Api)?;

        let queue = device.graphics_queue();
        transition_layout(
            pool,
            queue,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        copy_buffer_to_image(pool, queue, &staging, image, extent)?;
        transition_layout(
            pool,
            queue,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(color_subresource_range());
        texture.image_view = unsafe { raw.create_image_view(&view_info, None) }.map_err(VulkanError::Api)?;

        Ok(texture)
    }

    /// Image view for sampling
    pub fn view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Size in texels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let raw = self.device.handle();
        unsafe {
            if self.image_view != vk::ImageView::null() {
                raw.destroy_image_view(self.image_view, None);
            }
            raw.destroy_image(self.image, None);
            if self.memory != vk::DeviceMemory::null() {
                raw.free_memory(self.memory, None);
            }
        }
    }
}

slotmap::new_key_type! {
    /// Arena key for samplers inside a renderer
    pub struct SamplerKey;
}

/// Handle to a sampler living in a renderer's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle {
    pub(crate) key: SamplerKey,
    pub(crate) owner: OwnerId,
}

impl SamplerHandle {
    /// Renderer the sampler belongs to
    pub fn owner(&self) -> OwnerId {
        self.owner
    }
}

/// Immutable texture plus sampling parameters
pub struct Sampler {
    texture: Texture,
    sampler: vk::Sampler,
    filter: Filter,
    wrap: Wrap,
}

impl Sampler {
    /// Load `path` and build a sampler over it
    pub(crate) fn load(
        device: &Arc<LogicalDevice>,
        pool: &CommandPool,
        path: &Path,
        filter: Filter,
        wrap: Wrap,
    ) -> VulkanResult<Self> {
        let decoded = DecodedImage::load(path)?;
        log::debug!("Decoded {} ({}x{})", path.display(), decoded.width, decoded.height);

        let texture = Texture::from_decoded(Arc::clone(device), pool, &decoded)?;

        let address_mode = wrap.to_vk();
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(filter.to_vk())
            .min_filter(filter.to_vk())
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(true)
            .max_anisotropy(device.max_sampler_anisotropy())
            .border_color(vk::BorderColor::INT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(filter.mipmap_mode())
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = unsafe { device.handle().create_sampler(&sampler_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            texture,
            sampler,
            filter,
            wrap,
        })
    }

    /// Descriptor info for a combined image sampler binding
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.texture.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Underlying texture
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Filter the sampler was built with
    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Wrap mode the sampler was built with
    pub fn wrap(&self) -> Wrap {
        self.wrap
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.texture.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_resource_load_error() {
        let err = DecodedImage::load("/nonexistent.png").unwrap_err();
        assert!(err.is_resource_load());
        assert!(err.to_string().contains("/nonexistent.png"));
    }

    #[test]
    fn test_garbage_file_is_resource_load_error() {
        let path = std::env::temp_dir().join(format!("adore_garbage_{}.png", std::process::id()));
        std::fs::write(&path, b"definitely not a png").unwrap();
        let result = DecodedImage::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.unwrap_err().is_resource_load());
    }

    #[test]
    fn test_decode_converts_to_rgba8() {
        let path = std::env::temp_dir().join(format!("adore_decode_{}.png", std::process::id()));
        let source = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        source.save(&path).unwrap();

        let decoded = DecodedImage::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.pixels.len(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_supported_transitions() {
        let (src, dst, _, dst_stage) =
            transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(src, vk::AccessFlags::empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        let (_, dst, _, dst_stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_unsupported_transition() {
        assert!(transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR).is_none());
    }

    #[test]
    fn test_sampler_enums_map_to_vulkan() {
        assert_eq!(Filter::Nearest.to_vk(), vk::Filter::NEAREST);
        assert_eq!(Filter::Linear.mipmap_mode(), vk::SamplerMipmapMode::LINEAR);
        assert_eq!(Wrap::ClampToBorder.to_vk(), vk::SamplerAddressMode::CLAMP_TO_BORDER);
        assert_eq!(Wrap::default(), Wrap::Repeat);
    }
}

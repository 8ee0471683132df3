//! Vulkan swapchain management
//!
//! The chain is valid for exactly one extent and format. Any extent change
//! means building a new [`Swapchain`] (images, views and framebuffers) after
//! the device has drained; [`Window::recreate_swapchain`] drives that.
//!
//! [`Window::recreate_swapchain`]: super::window::Window::recreate_swapchain

use ash::vk;
use std::sync::Arc;

use super::framebuffer::Framebuffer;
use super::render_pass::RenderPass;
use super::{LogicalDevice, VulkanError, VulkanInstance, VulkanResult};

/// Whether the chain still matches the surface
///
/// Acquire and present report staleness through this value instead of an
/// error; the renderer consumes it and rebuilds the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    /// The chain matches the surface
    Optimal,
    /// The chain is out of date or suboptimal and must be recreated
    Stale,
}

impl ChainStatus {
    /// Whether a rebuild is required
    pub const fn is_stale(self) -> bool {
        matches!(self, Self::Stale)
    }

    /// Combine two observations; staleness wins
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        if self.is_stale() || other.is_stale() {
            Self::Stale
        } else {
            Self::Optimal
        }
    }
}

/// Surface capabilities, formats and present modes for one device
#[derive(Clone)]
pub struct SurfaceSupport {
    /// Extent bounds, image count bounds and transform
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query everything once from the physical device
    pub fn query(instance: &VulkanInstance, physical: vk::PhysicalDevice, surface: vk::SurfaceKHR) -> VulkanResult<Self> {
        let loader = instance.surface_loader();
        let capabilities = unsafe { loader.get_physical_device_surface_capabilities(physical, surface) }
            .map_err(VulkanError::Api)?;
        let formats = unsafe { loader.get_physical_device_surface_formats(physical, surface) }
            .map_err(VulkanError::Api)?;
        let present_modes = unsafe { loader.get_physical_device_surface_present_modes(physical, surface) }
            .map_err(VulkanError::Api)?;

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Re-read only the capabilities, whose current extent follows the window
    pub fn refresh_capabilities(
        &mut self,
        instance: &VulkanInstance,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<()> {
        self.capabilities = unsafe {
            instance
                .surface_loader()
                .get_physical_device_surface_capabilities(physical, surface)
        }
        .map_err(VulkanError::Api)?;
        Ok(())
    }
}

/// Prefer sRGB BGRA8, else whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX when vsync is off and available, otherwise the always-present FIFO
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent if fixed, else the framebuffer size clamped to the supported range
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: framebuffer.0.clamp(min.width, max.width),
        height: framebuffer.1.clamp(min.height, max.height),
    }
}

/// One more image than the minimum, capped when the surface has a maximum
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Swapchain with its image views and one framebuffer per image
pub struct Swapchain {
    device: Arc<LogicalDevice>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<Framebuffer>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Build a chain for `render_pass`, retiring `old_swapchain` if given
    pub fn new(
        device: Arc<LogicalDevice>,
        surface: vk::SurfaceKHR,
        support: &SurfaceSupport,
        render_pass: &RenderPass,
        framebuffer_size: (u32, u32),
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let format = choose_surface_format(&support.formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface has no formats".to_string()))?;
        let present_mode = choose_present_mode(&support.present_modes, vsync);
        let extent = choose_extent(&support.capabilities, framebuffer_size);
        let image_count = choose_image_count(&support.capabilities);

        let family_indices = [device.graphics_family(), device.present_family()];
        let (sharing_mode, queue_families): (vk::SharingMode, &[u32]) =
            if device.graphics_family() == device.present_family() {
                (vk::SharingMode::EXCLUSIVE, &[])
            } else {
                (vk::SharingMode::CONCURRENT, &family_indices)
            };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let loader = device.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(VulkanError::Api)?;

        // From here on, partial state is released by Drop on error.
        let mut chain = Self {
            device: Arc::clone(&device),
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format,
            extent,
            present_mode,
        };

        chain.images = unsafe { loader.get_swapchain_images(swapchain) }.map_err(VulkanError::Api)?;

        for &image in &chain.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.handle().create_image_view(&view_info, None) }.map_err(VulkanError::Api)?;
            chain.image_views.push(view);
        }

        for &view in &chain.image_views {
            let framebuffer = Framebuffer::new(Arc::clone(&device), render_pass.handle(), &[view], extent)?;
            chain.framebuffers.push(framebuffer);
        }

        log::info!(
            "Created swapchain {}x{} with {} images ({:?}, {:?})",
            extent.width,
            extent.height,
            chain.images.len(),
            format.format,
            present_mode
        );

        Ok(chain)
    }

    /// Acquire the next image, signaling `image_available` when it is ready
    ///
    /// Returns `None` when the chain is out of date and no image was
    /// acquired; the semaphore is left unsignaled in that case.
    pub fn acquire_next_image(&self, image_available: vk::Semaphore) -> VulkanResult<Option<(u32, ChainStatus)>> {
        let result = unsafe {
            self.device
                .swapchain_loader()
                .acquire_next_image(self.swapchain, u64::MAX, image_available, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok(Some((index, ChainStatus::Optimal))),
            Ok((index, true)) => {
                log::debug!("Swapchain suboptimal on acquire");
                Ok(Some((index, ChainStatus::Stale)))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on acquire");
                Ok(None)
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Present `image_index` once `wait` is signaled
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> VulkanResult<ChainStatus> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.device.swapchain_loader().queue_present(queue, &present_info) } {
            Ok(false) => Ok(ChainStatus::Optimal),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain stale on present");
                Ok(ChainStatus::Stale)
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Presentation mode in use
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Framebuffer for a swapchain image
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).map(Framebuffer::handle)
    }

    /// Number of framebuffers, one per image
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get image count
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.framebuffers.clear();
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device.swapchain_loader().destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_srgb_bgra() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats).map(|f| f.format), Some(vk::Format::B8G8R8A8_SRGB));
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(choose_surface_format(&formats).map(|f| f.format), Some(vk::Format::R8G8B8A8_UNORM));
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn test_present_mode_respects_vsync() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO], false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_fixed_surface_extent_wins() {
        let caps = capabilities((1280, 720), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, (640, 360));
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_framebuffer_size_is_clamped() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (1920, 1080));
        let extent = choose_extent(&caps, (4000, 0));
        assert_eq!((extent.width, extent.height), (1920, 1));

        let extent = choose_extent(&caps, (640, 360));
        assert_eq!((extent.width, extent.height), (640, 360));
    }

    #[test]
    fn test_image_count_respects_maximum() {
        let mut caps = capabilities((800, 600), (1, 1), (800, 600));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn test_staleness_merges() {
        assert_eq!(ChainStatus::Optimal.merge(ChainStatus::Optimal), ChainStatus::Optimal);
        assert_eq!(ChainStatus::Stale.merge(ChainStatus::Optimal), ChainStatus::Stale);
        assert_eq!(ChainStatus::Optimal.merge(ChainStatus::Stale), ChainStatus::Stale);
    }
}

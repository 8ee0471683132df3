//! Vulkan context management
//!
//! Instance creation with the debug messenger, physical device selection
//! and logical device creation. Every wrapper here owns its handle and
//! releases it on drop; the logical device keeps the instance alive through
//! an `Arc`, so the instance is always destroyed last.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use super::library::GlfwLibrary;
use super::window::WindowError;
use crate::core::config::ApplicationConfig;

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &str = "Adore";

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan object creation failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Call made in the wrong state or with bad arguments
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Object used with a window or renderer it was not created against
    #[error("{object} belongs to #{found} but was used with #{expected}")]
    OwnerMismatch {
        /// Kind of object that was misused
        object: &'static str,
        /// Identity of the renderer or window performing the call
        expected: u64,
        /// Identity the object was created against
        found: u64,
    },

    /// Shader bytecode or image file could not be read or decoded
    #[error("Failed to load {}: {reason}", .path.display())]
    ResourceLoad {
        /// File that failed to load
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Windowing failure
    #[error(transparent)]
    Window(#[from] WindowError),
}

impl VulkanError {
    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }

    /// Programming error on the caller's side
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::InvalidOperation { .. } | Self::OwnerMismatch { .. })
    }

    /// File loading failure, distinct from driver failures
    pub const fn is_resource_load(&self) -> bool {
        matches!(self, Self::ResourceLoad { .. })
    }

    /// Driver, allocation or windowing failure with no recovery path
    pub const fn is_fatal(&self) -> bool {
        !self.is_usage() && !self.is_resource_load()
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Log an error on its way to the caller
pub(crate) fn logged<T>(result: VulkanResult<T>, what: &str) -> VulkanResult<T> {
    if let Err(e) = &result {
        log::error!("{what}: {e}");
    }
    result
}

/// Log a failed drain inside a `Drop`, which has no caller to report to
///
/// Returns whether the GPU work was drained.
pub(crate) fn drained(result: VulkanResult<()>, what: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("Failed to drain {what} before teardown: {e}");
            false
        }
    }
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    surface_loader: Surface,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    library: GlfwLibrary,
}

impl VulkanInstance {
    /// Create the instance, optionally with validation and the debug messenger
    pub fn new(library: GlfwLibrary, app: &ApplicationConfig, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(app.name.as_str())
            .map_err(|_| VulkanError::InitializationFailed("Application name contains NUL".to_string()))?;
        let engine_name = CString::new(ENGINE_NAME)
            .map_err(|_| VulkanError::InitializationFailed("Engine name contains NUL".to_string()))?;
        let (major, minor, patch) = app.version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let enable_validation = enable_validation && Self::validation_layer_available(&entry)?;

        let required = library.required_instance_extensions()?;
        let mut extension_names = required
            .iter()
            .map(|name| {
                CString::new(name.as_str())
                    .map_err(|_| VulkanError::InitializationFailed(format!("Bad extension name {name}")))
            })
            .collect::<VulkanResult<Vec<_>>>()?;
        if enable_validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        if cfg!(target_os = "macos") {
            extension_names.push(vk::KhrPortabilityEnumerationFn::name().to_owned());
        }
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();

        let layer_names: Vec<CString> = if enable_validation {
            vec![CString::new(VALIDATION_LAYER)
                .map_err(|_| VulkanError::InitializationFailed("Layer name contains NUL".to_string()))?]
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let flags = if cfg!(target_os = "macos") {
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);

        log::info!(
            "Created Vulkan instance for '{}' (validation {})",
            app.name,
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            surface_loader,
            debug,
            library,
        })
    }

    fn validation_layer_available(entry: &Entry) -> VulkanResult<bool> {
        let layers = entry.enumerate_instance_layer_properties().map_err(VulkanError::Api)?;
        let available = layers.iter().any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_bytes() == VALIDATION_LAYER.as_bytes()
        });
        if !available {
            log::warn!("{VALIDATION_LAYER} requested but not installed, continuing without validation");
        }
        Ok(available)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(VulkanError::Api)
    }

    /// Vulkan entry points
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance handle and function table
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Surface extension loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// GLFW library this instance was created with
    pub fn library(&self) -> &GlfwLibrary {
        &self.library
    }

    /// Whether the debug messenger is installed
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("Destroyed Vulkan instance");
    }
}

/// Forwards validation messages into the `log` facade
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    match severity_level(message_severity) {
        log::Level::Error => log::error!("[Vulkan] {message_type:?} - {message}"),
        log::Level::Warn => log::warn!("[Vulkan] {message_type:?} - {message}"),
        log::Level::Debug => log::debug!("[Vulkan] {message_type:?} - {message}"),
        _ => log::trace!("[Vulkan] {message_type:?} - {message}"),
    }

    vk::FALSE
}

fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Debug
    } else {
        log::Level::Trace
    }
}

/// Rank a device: discrete GPUs first, then by maximum 2D image size
pub fn device_score(device_type: vk::PhysicalDeviceType, max_image_dimension_2d: u32) -> u64 {
    let discrete_bonus = if device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        1000
    } else {
        0
    };
    discrete_bonus + u64::from(max_image_dimension_2d)
}

/// Pick graphics and present queue families, preferring one family that does both
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<(u32, u32)> {
    let mut graphics = None;
    let mut present = None;

    for (index, family) in (0u32..).zip(families) {
        let is_graphics = family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let can_present = supports_present(index);

        if is_graphics && can_present {
            return Some((index, index));
        }
        if is_graphics && graphics.is_none() {
            graphics = Some(index);
        }
        if can_present && present.is_none() {
            present = Some(index);
        }
    }

    graphics.zip(present)
}

/// Find a memory type index matching a filter and property set
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        (type_filter & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}

/// Physical device selection and capabilities
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the highest scoring device that can render to `surface`
    pub fn select_suitable_device(instance: &VulkanInstance, surface: vk::SurfaceKHR) -> VulkanResult<Self> {
        let devices = unsafe { instance.instance().enumerate_physical_devices() }.map_err(VulkanError::Api)?;

        let mut best: Option<(u64, Self)> = None;
        for device in devices {
            match Self::evaluate_device(instance, device, surface) {
                Ok(info) => {
                    let score = device_score(
                        info.properties.device_type,
                        info.properties.limits.max_image_dimension2_d,
                    );
                    log::debug!("GPU candidate {} scored {score}", info.name());
                    if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
                        best = Some((score, info));
                    }
                }
                Err(reason) => log::debug!("Skipping GPU: {reason}"),
            }
        }

        let (_, info) = best.ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))?;
        log::info!("Selected GPU: {}", info.name());
        Ok(info)
    }

    fn evaluate_device(
        instance: &VulkanInstance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        let raw = instance.instance();
        let surface_loader = instance.surface_loader();
        let properties = unsafe { raw.get_physical_device_properties(device) };
        let features = unsafe { raw.get_physical_device_features(device) };
        let memory_properties = unsafe { raw.get_physical_device_memory_properties(device) };
        let queue_families = unsafe { raw.get_physical_device_queue_family_properties(device) };

        let (graphics_family, present_family) = pick_queue_families(&queue_families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        })
        .ok_or_else(|| VulkanError::InitializationFailed("Missing graphics or present queue".to_string()))?;

        let extensions =
            unsafe { raw.enumerate_device_extension_properties(device) }.map_err(VulkanError::Api)?;
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed(
                "Swapchain extension not supported".to_string(),
            ));
        }

        let formats = unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }
            .map_err(VulkanError::Api)?;
        let present_modes = unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }
            .map_err(VulkanError::Api)?;
        if formats.is_empty() || present_modes.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Surface reports no formats or present modes".to_string(),
            ));
        }

        if features.sampler_anisotropy == vk::FALSE {
            return Err(VulkanError::InitializationFailed(
                "Sampler anisotropy not supported".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
        })
    }

    /// Human readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: SwapchainLoader,
    physical: PhysicalDeviceInfo,
    instance: Arc<VulkanInstance>,
}

impl LogicalDevice {
    /// Create a logical device with graphics and present queues
    pub fn new(instance: Arc<VulkanInstance>, physical: PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: HashSet<u32> = [physical.graphics_family, physical.present_family].into_iter().collect();
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let mut extensions = vec![SwapchainLoader::name().as_ptr()];
        if cfg!(target_os = "macos") {
            extensions.push(vk::KhrPortabilitySubsetFn::name().as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true).build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.instance().create_device(physical.device, &create_info, None) }
            .map_err(VulkanError::Api)?;

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance.instance(), &device);

        log::info!(
            "Created logical device (graphics family {}, present family {})",
            physical.graphics_family,
            physical.present_family
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            physical,
            instance,
        })
    }

    /// Device function table
    pub fn handle(&self) -> &Device {
        &self.device
    }

    /// Queue used for rendering and uploads
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Queue used for presentation
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.physical.graphics_family
    }

    /// Present queue family index
    pub fn present_family(&self) -> u32 {
        self.physical.present_family
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Selected physical device
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Instance this device was created from
    pub fn instance(&self) -> &Arc<VulkanInstance> {
        &self.instance
    }

    /// Largest anisotropy the device supports
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.physical.properties.limits.max_sampler_anisotropy
    }

    /// Find memory type with required properties
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type_index(&self.physical.memory_properties, type_filter, properties)
            .ok_or(VulkanError::NoSuitableMemoryType)
    }

    /// Block until all queues are idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(VulkanError::Api)
    }

    /// Block until the graphics queue is idle
    pub fn wait_graphics_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.queue_wait_idle(self.graphics_queue) }.map_err(VulkanError::Api)
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        drained(
            unsafe { self.device.device_wait_idle() }.map_err(VulkanError::Api),
            "logical device",
        );
        unsafe {
            self.device.destroy_device(None);
        }
        log::debug!("Destroyed logical device");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_drain_is_reported_not_swallowed() {
        assert!(drained(Ok(()), "test device"));
        assert!(!drained(Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)), "test device"));
    }

    #[test]
    fn test_discrete_gpu_outranks_integrated() {
        let discrete = device_score(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        let integrated = device_score(vk::PhysicalDeviceType::INTEGRATED_GPU, 8192);
        assert_eq!(discrete, integrated + 1000);
    }

    #[test]
    fn test_larger_images_break_ties() {
        let small = device_score(vk::PhysicalDeviceType::INTEGRATED_GPU, 4096);
        let large = device_score(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        assert!(large > small);
    }

    #[test]
    fn test_prefers_family_that_graphics_and_presents() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let picked = pick_queue_families(&families, |index| index != 0);
        assert_eq!(picked, Some((2, 2)));
    }

    #[test]
    fn test_split_graphics_and_present_families() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let picked = pick_queue_families(&families, |index| index == 1);
        assert_eq!(picked, Some((0, 1)));
    }

    #[test]
    fn test_no_present_support_yields_none() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(pick_queue_families(&families, |_| false), None);
    }

    #[test]
    fn test_memory_type_matches_filter_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type_index(&props, 0b111, host), Some(1));
        assert_eq!(find_memory_type_index(&props, 0b100, host), Some(2));
        assert_eq!(
            find_memory_type_index(&props, 0b010, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR), log::Level::Error);
        assert_eq!(severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING), log::Level::Warn);
        assert_eq!(severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::INFO), log::Level::Debug);
        assert_eq!(severity_level(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE), log::Level::Trace);
    }

    #[test]
    fn test_error_taxonomy() {
        assert!(VulkanError::invalid_operation("draw outside frame").is_usage());
        let load = VulkanError::ResourceLoad {
            path: PathBuf::from("/nonexistent.png"),
            reason: "not found".to_string(),
        };
        assert!(load.is_resource_load());
        assert!(!load.is_fatal());
        assert!(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST).is_fatal());
        assert!(load.to_string().contains("/nonexistent.png"));
    }
}

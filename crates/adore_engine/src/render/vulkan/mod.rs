//! Vulkan rendering backend
//!
//! Every wrapper owns its Vulkan handle and holds an `Arc` to whatever it was
//! created from, so teardown always runs leaf-first: pipelines and buffers,
//! then the renderer's sync objects, then the window's swapchain and surface,
//! then the device, and finally the instance and GLFW itself.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor_set;
pub mod framebuffer;
pub mod library;
pub mod render_pass;
pub mod renderer;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod uniform_buffer;
pub mod vertex_layout;
pub mod window;

pub use buffer::{Buffer, IndexBuffer, VertexBuffer};
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult};
pub use renderer::{FrameState, Renderer};
pub use shader::{Shader, ShaderModuleSource, UniformResource};
pub use swapchain::{ChainStatus, Swapchain};
pub use texture::{Filter, Sampler, SamplerHandle, Wrap};
pub use uniform_buffer::{ShadowCopy, UniformBuffer, UniformBufferHandle};
pub use window::{Window, WindowError};

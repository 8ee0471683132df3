//! # Adore Engine
//!
//! A thin Vulkan engine: a context, a window with its swapchain, a renderer
//! that drives a ring of frames in flight, and the buffers, textures and
//! shaders drawn with it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adore_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     adore_engine::core::logging::init();
//!
//!     let context = Context::new(GraphicsApi::Vulkan, "Example")?;
//!     let window = Window::new(&context, &WindowConfig::new("Example").with_size(640, 360))?;
//!     let mut renderer = Renderer::new(window, &RendererConfig::default())?;
//!
//!     let vertices: [[f32; 2]; 3] = [[0.0, -0.5], [0.5, 0.5], [-0.5, 0.5]];
//!     let vertex_buffer = VertexBuffer::new(&renderer, &vertices)?;
//!
//!     let layout = LayoutDescriptor::new()
//!         .with_binding(0, 8)
//!         .with_attribute(0, 0, 0, AttributeFormat::Vec2);
//!     let modules = [
//!         ShaderModuleSource::new(ShaderStage::Vertex, "target/shaders/triangle.vert.spv"),
//!         ShaderModuleSource::new(ShaderStage::Fragment, "target/shaders/triangle.frag.spv"),
//!     ];
//!     let shader = Shader::new(&renderer, &modules, layout, &[])?;
//!
//!     while renderer.window().is_open() {
//!         renderer.window_mut().poll();
//!         renderer.begin(&shader)?;
//!         renderer.bind_vertex_buffer(&vertex_buffer, 0)?;
//!         renderer.draw(3)?;
//!         renderer.end()?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Objects must be dropped leaf-first (shaders and buffers before the
//! renderer); shared `Arc`s keep the device alive until the last one goes.

pub mod core;
pub mod render;

pub use crate::core::{EngineError, EngineResult};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, Config, EngineConfig, RendererConfig, WindowConfig},
        core::{EngineError, EngineResult},
        render::layout::{AttributeFormat, LayoutDescriptor, ResourceKind, ShaderStage},
        render::vulkan::{
            Filter, IndexBuffer, Renderer, SamplerHandle, Shader, ShaderModuleSource, UniformBufferHandle,
            UniformResource, VertexBuffer, VulkanError, VulkanResult, Window, Wrap,
        },
        render::{Context, GraphicsApi},
    };
}

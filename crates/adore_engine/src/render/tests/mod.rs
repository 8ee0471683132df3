//! End-to-end scenarios against a real driver
//!
//! These need a Vulkan implementation, a display and the SPIR-V produced by
//! the build script, so they are ignored by default. Run them with
//! `cargo test -p adore_engine -- --ignored --test-threads=1`.

mod frame_loop;
mod resources;

use std::path::PathBuf;

use crate::core::config::{RendererConfig, WindowConfig};
use crate::render::api::{Context, GraphicsApi};
use crate::render::layout::{AttributeFormat, LayoutDescriptor, ResourceKind, ShaderStage};
use crate::render::vulkan::{Renderer, ShaderModuleSource, Window};

fn shader_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../target/shaders")
        .join(format!("{name}.spv"))
}

fn setup(title: &str) -> (Context, Renderer) {
    let _ = env_logger::builder().is_test(true).try_init();
    let context = Context::new(GraphicsApi::Vulkan, "TestApp").unwrap();
    let window = Window::new(&context, &WindowConfig::new(title).with_size(640, 360)).unwrap();
    let renderer = Renderer::new(window, &RendererConfig::default()).unwrap();
    (context, renderer)
}

/// position vec2 + color vec3
fn triangle_vertices() -> [[f32; 5]; 3] {
    [
        [0.0, -0.5, 1.0, 0.0, 0.0],
        [0.5, 0.5, 0.0, 1.0, 0.0],
        [-0.5, 0.5, 0.0, 0.0, 1.0],
    ]
}

fn triangle_modules() -> [ShaderModuleSource; 2] {
    [
        ShaderModuleSource::new(ShaderStage::Vertex, shader_path("triangle.vert")),
        ShaderModuleSource::new(ShaderStage::Fragment, shader_path("triangle.frag")),
    ]
}

fn triangle_layout() -> LayoutDescriptor {
    LayoutDescriptor::new()
        .with_binding(0, 20)
        .with_attribute(0, 0, 0, AttributeFormat::Vec2)
        .with_attribute(0, 1, 8, AttributeFormat::Vec3)
}

fn quad_modules() -> [ShaderModuleSource; 2] {
    [
        ShaderModuleSource::new(ShaderStage::Vertex, shader_path("quad.vert")),
        ShaderModuleSource::new(ShaderStage::Fragment, shader_path("quad.frag")),
    ]
}

fn quad_layout() -> LayoutDescriptor {
    LayoutDescriptor::new()
        .with_binding(0, 16)
        .with_attribute(0, 0, 0, AttributeFormat::Vec2)
        .with_attribute(0, 1, 8, AttributeFormat::Vec2)
        .with_resource(0, ShaderStage::Vertex, ResourceKind::Buffer)
        .with_resource(1, ShaderStage::Fragment, ResourceKind::Sampler)
}

/// Write a small checkerboard PNG and return its path
fn checkerboard_png(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("adore_{name}_{}.png", std::process::id()));
    let image = image::RgbaImage::from_fn(4, 4, |x, y| {
        if (x + y) % 2 == 0 {
            image::Rgba([255, 255, 255, 255])
        } else {
            image::Rgba([0, 0, 0, 255])
        }
    });
    image.save(&path).unwrap();
    path
}

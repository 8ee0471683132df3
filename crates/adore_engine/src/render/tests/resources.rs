use super::*;
use crate::render::vulkan::{Filter, IndexBuffer, VertexBuffer, Wrap};

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_vertex_buffer_round_trip() {
    let (_context, renderer) = setup("vertex read back");
    let vertices = triangle_vertices();
    let buffer = VertexBuffer::new(&renderer, &vertices).unwrap();

    let contents = buffer.read_back(&renderer).unwrap();
    assert_eq!(contents, bytemuck::cast_slice::<[f32; 5], u8>(&vertices));
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_index_buffer_round_trip() {
    let (_context, renderer) = setup("index read back");
    let indices = [0u32, 1, 2, 2, 3, 0];
    let buffer = IndexBuffer::new(&renderer, &indices).unwrap();

    assert_eq!(buffer.index_count(), 6);
    assert_eq!(buffer.read_back(&renderer).unwrap(), bytemuck::cast_slice::<u32, u8>(&indices));
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_missing_texture_is_resource_load_error() {
    let (_context, mut renderer) = setup("missing texture");
    let err = renderer
        .create_sampler("/nonexistent.png", Filter::Linear, Wrap::Repeat)
        .unwrap_err();
    assert!(err.is_resource_load());
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_texture_upload() {
    let (_context, mut renderer) = setup("texture");
    let path = checkerboard_png("texture");
    let handle = renderer.create_sampler(&path, Filter::Linear, Wrap::ClampToBorder).unwrap();
    std::fs::remove_file(&path).ok();

    let sampler = renderer.sampler(handle).unwrap();
    assert_eq!(sampler.texture().extent().width, 4);
    assert_eq!(sampler.wrap(), Wrap::ClampToBorder);
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_missing_shader_bytecode_is_resource_load_error() {
    let (_context, renderer) = setup("missing shader");
    let modules = [
        ShaderModuleSource::new(ShaderStage::Vertex, "/nonexistent/a.vert.spv"),
        ShaderModuleSource::new(ShaderStage::Fragment, "/nonexistent/a.frag.spv"),
    ];
    let err = crate::render::vulkan::Shader::new(&renderer, &modules, triangle_layout(), &[]).unwrap_err();
    assert!(err.is_resource_load());
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_shader_with_unattached_resources_is_rejected() {
    let (_context, mut renderer) = setup("unattached resources");
    let err = crate::render::vulkan::Shader::new(&renderer, &quad_modules(), quad_layout(), &[]).unwrap_err();
    assert!(err.is_usage());

    let uniform = renderer.create_uniform_buffer(&[0u8; 80]).unwrap();
    let partial = [crate::render::vulkan::UniformResource::Buffer {
        binding: 0,
        handle: uniform,
    }];
    let err = crate::render::vulkan::Shader::new(&renderer, &quad_modules(), quad_layout(), &partial).unwrap_err();
    assert!(err.to_string().contains("[1]"));
}

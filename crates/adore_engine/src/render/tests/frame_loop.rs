use super::*;
use crate::render::vulkan::{Filter, Shader, UniformResource, VertexBuffer, VulkanError, Wrap};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Transform {
    model: [[f32; 4]; 4],
    tint: [f32; 4],
}

const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_single_triangle_frame_advances_slot() {
    let (_context, mut renderer) = setup("single frame");
    let vertex_buffer = VertexBuffer::new(&renderer, &triangle_vertices()).unwrap();
    let shader = Shader::new(&renderer, &triangle_modules(), triangle_layout(), &[]).unwrap();

    let before = renderer.current_frame();
    renderer.begin(&shader).unwrap();
    renderer.bind_vertex_buffer(&vertex_buffer, 0).unwrap();
    renderer.draw(3).unwrap();
    renderer.end().unwrap();

    assert_eq!(renderer.current_frame(), (before + 1) % renderer.frames_in_flight());
    assert_eq!(renderer.frames_completed(), 1);
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_many_frames_cycle_through_slots() {
    let (_context, mut renderer) = setup("many frames");
    let vertex_buffer = VertexBuffer::new(&renderer, &triangle_vertices()).unwrap();
    let shader = Shader::new(&renderer, &triangle_modules(), triangle_layout(), &[]).unwrap();

    for n in 1..=10u64 {
        renderer.begin(&shader).unwrap();
        renderer.bind_vertex_buffer(&vertex_buffer, 0).unwrap();
        renderer.draw(3).unwrap();
        renderer.end().unwrap();
        assert_eq!(renderer.current_frame(), (n as usize) % renderer.frames_in_flight());
    }
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_call_order_violations_are_usage_errors() {
    let (_context, mut renderer) = setup("call order");
    let shader = Shader::new(&renderer, &triangle_modules(), triangle_layout(), &[]).unwrap();

    assert!(renderer.draw(3).unwrap_err().is_usage());
    assert!(renderer.end().unwrap_err().is_usage());
    assert_eq!(renderer.frames_completed(), 0);

    renderer.begin(&shader).unwrap();
    assert!(renderer.begin(&shader).unwrap_err().is_usage());
    renderer.draw(3).unwrap();
    renderer.end().unwrap();
    assert_eq!(renderer.frames_completed(), 1);
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_foreign_buffer_is_rejected() {
    let (_context, mut renderer_a) = setup("renderer a");
    let (_other, renderer_b) = setup("renderer b");
    let foreign = VertexBuffer::new(&renderer_b, &triangle_vertices()).unwrap();
    let shader = Shader::new(&renderer_a, &triangle_modules(), triangle_layout(), &[]).unwrap();

    renderer_a.begin(&shader).unwrap();
    let err = renderer_a.bind_vertex_buffer(&foreign, 0).unwrap_err();
    assert!(matches!(err, VulkanError::OwnerMismatch { object: "VertexBuffer", .. }));
    renderer_a.draw(3).unwrap();
    renderer_a.end().unwrap();
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_foreign_shader_is_rejected_before_waiting() {
    let (_context, mut renderer_a) = setup("shader owner a");
    let (_other, renderer_b) = setup("shader owner b");
    let shader_b = Shader::new(&renderer_b, &triangle_modules(), triangle_layout(), &[]).unwrap();

    assert!(matches!(
        renderer_a.begin(&shader_b),
        Err(VulkanError::OwnerMismatch { object: "Shader", .. })
    ));
    assert_eq!(renderer_a.frame_state(), crate::render::vulkan::FrameState::Idle);
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_uniform_set_reaches_slot_at_begin() {
    let (_context, mut renderer) = setup("uniforms");
    let texture = checkerboard_png("uniforms");
    let sampler = renderer.create_sampler(&texture, Filter::Nearest, Wrap::Repeat).unwrap();
    std::fs::remove_file(&texture).ok();

    let initial = Transform {
        model: IDENTITY,
        tint: [1.0; 4],
    };
    let uniform = renderer.create_uniform_buffer_typed(&initial).unwrap();
    let shader = Shader::new(
        &renderer,
        &quad_modules(),
        quad_layout(),
        &[
            UniformResource::Buffer {
                binding: 0,
                handle: uniform,
            },
            UniformResource::Sampler {
                binding: 1,
                handle: sampler,
            },
        ],
    )
    .unwrap();

    for value in [0.25f32, 0.5, 0.75] {
        let next = Transform {
            model: IDENTITY,
            tint: [value; 4],
        };
        renderer.set_uniform_typed(uniform, &next).unwrap();
    }

    let slot = renderer.current_frame();
    renderer.begin(&shader).unwrap();
    let buffer = renderer.uniform_buffer(uniform).unwrap();
    assert!(!buffer.is_dirty(slot));
    let expected = Transform {
        model: IDENTITY,
        tint: [0.75; 4],
    };
    assert_eq!(buffer.slot_contents(slot).unwrap(), bytemuck::bytes_of(&expected));
    assert!(buffer.is_dirty((slot + 1) % renderer.frames_in_flight()));
    renderer.end().unwrap();
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_resize_rebuilds_swapchain() {
    let (_context, mut renderer) = setup("resize");
    let vertex_buffer = VertexBuffer::new(&renderer, &triangle_vertices()).unwrap();
    let shader = Shader::new(&renderer, &triangle_modules(), triangle_layout(), &[]).unwrap();

    renderer.request_resize(0, 0);
    renderer.window_mut().poll();
    renderer.request_resize(320, 200);
    renderer.window_mut().poll();
    assert!(renderer.window().was_resized());
    renderer.window_mut().recreate_swapchain().unwrap();

    let swapchain = renderer.window().swapchain().unwrap();
    assert_eq!(swapchain.framebuffer_count(), swapchain.image_count() as usize);

    renderer.begin(&shader).unwrap();
    renderer.bind_vertex_buffer(&vertex_buffer, 0).unwrap();
    renderer.draw(3).unwrap();
    renderer.end().unwrap();
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_discarded_frame_leaves_slot_ready() {
    let (_context, mut renderer) = setup("discard");
    let vertex_buffer = VertexBuffer::new(&renderer, &triangle_vertices()).unwrap();
    let shader = Shader::new(&renderer, &triangle_modules(), triangle_layout(), &[]).unwrap();

    assert!(renderer.discard().unwrap_err().is_usage());

    let slot = renderer.current_frame();
    renderer.begin(&shader).unwrap();
    renderer.discard().unwrap();
    assert_eq!(renderer.frame_state(), crate::render::vulkan::FrameState::Idle);
    assert_eq!(renderer.current_frame(), slot);

    renderer.wait_idle().unwrap();
    assert!(renderer.slot_ready(slot).unwrap());

    // The same slot must begin again without blocking on its fence
    renderer.begin(&shader).unwrap();
    renderer.bind_vertex_buffer(&vertex_buffer, 0).unwrap();
    renderer.draw(3).unwrap();
    renderer.end().unwrap();
    assert_eq!(renderer.frames_completed(), 1);
    assert_eq!(renderer.current_frame(), (slot + 1) % renderer.frames_in_flight());
}

#[test]
#[ignore = "requires a Vulkan driver and a display"]
fn test_resize_is_applied_by_the_frame_loop() {
    let (_context, mut renderer) = setup("resize in frame");
    let vertex_buffer = VertexBuffer::new(&renderer, &triangle_vertices()).unwrap();
    let shader = Shader::new(&renderer, &triangle_modules(), triangle_layout(), &[]).unwrap();

    let before = renderer.current_frame();
    renderer.request_resize(320, 200);
    renderer.window_mut().poll();
    assert!(renderer.window().was_resized());

    renderer.begin(&shader).unwrap();
    renderer.bind_vertex_buffer(&vertex_buffer, 0).unwrap();
    renderer.draw(3).unwrap();
    renderer.end().unwrap();

    assert_eq!(renderer.current_frame(), (before + 1) % renderer.frames_in_flight());
    assert!(!renderer.window().was_resized());
    let swapchain = renderer.window().swapchain().unwrap();
    assert_eq!(swapchain.framebuffer_count(), swapchain.image_count() as usize);
    let (width, height) = renderer.window().framebuffer_size();
    assert_eq!((swapchain.extent().width, swapchain.extent().height), (width, height));

    renderer.begin(&shader).unwrap();
    renderer.draw(3).unwrap();
    renderer.end().unwrap();
    assert_eq!(renderer.frames_completed(), 2);
}

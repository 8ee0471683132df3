//! Textured quad demo
//!
//! Draws a spinning, tinted checkerboard quad with an index buffer, a
//! per-frame uniform buffer and a combined image sampler.

use adore_engine::prelude::*;
use glfw::{Action, Key, WindowEvent};
use std::path::{Path, PathBuf};
use std::time::Instant;

const CONFIG_PATH: &str = "resources/config.toml";
const SHADER_DIR: &str = "target/shaders";
const CHECKER_SIZE: u32 = 64;

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    #[error("Failed to write texture: {0}")]
    Texture(#[from] image::ImageError),
}

/// Matches the `Transform` block in quad.vert
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Transform {
    model: [[f32; 4]; 4],
    tint: [f32; 4],
}

impl Transform {
    fn at(seconds: f32, aspect: f32) -> Self {
        let (sin, cos) = seconds.sin_cos();
        // Column-major Z rotation with the X axis corrected for aspect
        let model = [
            [cos / aspect, sin, 0.0, 0.0],
            [-sin / aspect, cos, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let pulse = 0.75 + 0.25 * (seconds * 2.0).sin();
        Self {
            model,
            tint: [1.0, pulse, 1.0 - pulse * 0.5, 1.0],
        }
    }
}

/// position vec2 + uv vec2
const QUAD_VERTICES: [[f32; 4]; 4] = [
    [-0.5, -0.5, 0.0, 0.0],
    [0.5, -0.5, 1.0, 0.0],
    [0.5, 0.5, 1.0, 1.0],
    [-0.5, 0.5, 0.0, 1.0],
];

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

fn load_config() -> EngineConfig {
    if !Path::new(CONFIG_PATH).exists() {
        return EngineConfig::new("Textured Quad");
    }
    match EngineConfig::load_validated(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring {CONFIG_PATH}: {e}");
            EngineConfig::new("Textured Quad")
        }
    }
}

fn write_checkerboard() -> Result<PathBuf, AppError> {
    let path = std::env::temp_dir().join("adore_checkerboard.png");
    let image = image::RgbaImage::from_fn(CHECKER_SIZE, CHECKER_SIZE, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            image::Rgba([230, 230, 230, 255])
        } else {
            image::Rgba([40, 40, 60, 255])
        }
    });
    image.save(&path)?;
    Ok(path)
}

fn shader(name: &str) -> PathBuf {
    Path::new(SHADER_DIR).join(format!("{name}.spv"))
}

struct QuadApp {
    // Declared before the renderer so they are dropped first
    shader: Shader,
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    transform: UniformBufferHandle,
    renderer: Renderer,
    _context: Context,
    start_time: Instant,
}

impl QuadApp {
    fn new(config: &EngineConfig) -> Result<Self, AppError> {
        let context = Context::from_config(GraphicsApi::Vulkan, config)?;
        let window = Window::new(&context, &config.window)?;
        let mut renderer = Renderer::new(window, &config.renderer)?;

        let vertex_buffer = VertexBuffer::new(&renderer, &QUAD_VERTICES)?;
        let index_buffer = IndexBuffer::new(&renderer, &QUAD_INDICES)?;

        let texture_path = write_checkerboard()?;
        let sampler = renderer.create_sampler(&texture_path, Filter::Nearest, Wrap::Repeat)?;
        let transform = renderer.create_uniform_buffer_typed(&Transform::at(0.0, 1.0))?;

        let layout = LayoutDescriptor::new()
            .with_binding(0, 16)
            .with_attribute(0, 0, 0, AttributeFormat::Vec2)
            .with_attribute(0, 1, 8, AttributeFormat::Vec2)
            .with_resource(0, ShaderStage::Vertex, ResourceKind::Buffer)
            .with_resource(1, ShaderStage::Fragment, ResourceKind::Sampler);
        let modules = [
            ShaderModuleSource::new(ShaderStage::Vertex, shader("quad.vert")),
            ShaderModuleSource::new(ShaderStage::Fragment, shader("quad.frag")),
        ];
        let resources = [
            UniformResource::Buffer {
                binding: 0,
                handle: transform,
            },
            UniformResource::Sampler {
                binding: 1,
                handle: sampler,
            },
        ];
        let shader = Shader::new(&renderer, &modules, layout, &resources)?;

        Ok(Self {
            shader,
            vertex_buffer,
            index_buffer,
            transform,
            renderer,
            _context: context,
            start_time: Instant::now(),
        })
    }

    fn handle_events(&mut self) {
        for event in self.renderer.window_mut().poll() {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => {
                    self.renderer.window_mut().close();
                }
                WindowEvent::FramebufferSize(width, height) => {
                    log::debug!("Framebuffer resized to {width}x{height}");
                }
                _ => {}
            }
        }
    }

    fn draw_frame(&mut self) -> Result<(), AppError> {
        let extent = self.renderer.window().extent();
        let aspect = if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        };
        let seconds = self.start_time.elapsed().as_secs_f32();
        self.renderer
            .set_uniform_typed(self.transform, &Transform::at(seconds, aspect))?;

        self.renderer.begin(&self.shader)?;
        self.renderer.bind_vertex_buffer(&self.vertex_buffer, 0)?;
        self.renderer.bind_index_buffer(&self.index_buffer)?;
        self.renderer.draw_indexed(self.index_buffer.index_count())?;
        self.renderer.end()?;
        Ok(())
    }

    fn run(&mut self) -> Result<(), AppError> {
        log::info!("Entering main loop");
        while self.renderer.window().is_open() {
            self.handle_events();
            if !self.renderer.window().is_open() {
                break;
            }
            self.draw_frame()?;
        }
        self.renderer.wait_idle()?;
        log::info!(
            "Main loop finished after {} frames",
            self.renderer.frames_completed()
        );
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC occurred: {panic_info}");
        if let Some(location) = panic_info.location() {
            eprintln!("Panic location: {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    log::info!("Starting textured quad demo");
    let config = load_config();

    let mut app = QuadApp::new(&config)?;
    match app.run() {
        Ok(()) => {
            log::info!("Demo finished successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Application error: {e}");
            Err(e.into())
        }
    }
}

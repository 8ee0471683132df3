//! The frame loop
//!
//! A [`Renderer`] owns its [`Window`] and drives one frame at a time through
//! a fixed ring of frame slots. For the slot in use it:
//!
//! 1. waits on the slot's fence (the only point where the CPU blocks on the GPU),
//! 2. acquires a swapchain image,
//! 3. records the slot's command buffer between `begin` and `end`,
//! 4. resets the fence and submits, signaling it and the render-finished semaphore,
//! 5. presents, rebuilding the swapchain if acquire or present reported it stale.
//!
//! The fence is reset immediately before the submit that signals it. A frame
//! that fails between acquire and submit is released with an empty submit
//! that consumes the image-available semaphore and signals the fence, so the
//! slot's next wait always returns.

pub mod frame_cycle;

use ash::vk;
use slotmap::SlotMap;
use std::path::Path;
use std::sync::Arc;

use super::buffer::{IndexBuffer, VertexBuffer};
use super::commands::CommandPool;
use super::context::{drained, logged};
use super::shader::Shader;
use super::swapchain::ChainStatus;
use super::sync::FrameSync;
use super::texture::{Filter, Sampler, SamplerHandle, SamplerKey, Wrap};
use super::uniform_buffer::{UniformBuffer, UniformBufferHandle, UniformBufferKey};
use super::window::Window;
use super::{LogicalDevice, VulkanError, VulkanResult};
use crate::core::config::RendererConfig;
use crate::render::ownership::OwnerId;
use frame_cycle::FrameCycle;

pub use frame_cycle::FrameState;

/// Attempts to acquire an image before giving up on a chain that keeps going stale
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

struct ActiveFrame {
    slot: usize,
    image_index: u32,
    acquire_status: ChainStatus,
    command_buffer: vk::CommandBuffer,
}

/// Frame state machine bound to one window
pub struct Renderer {
    id: OwnerId,
    cycle: FrameCycle,
    active: Option<ActiveFrame>,
    clear_color: [f32; 4],
    command_buffers: Vec<vk::CommandBuffer>,
    uniforms: SlotMap<UniformBufferKey, UniformBuffer>,
    samplers: SlotMap<SamplerKey, Sampler>,
    frame_sync: Vec<FrameSync>,
    command_pool: CommandPool,
    device: Arc<LogicalDevice>,
    window: Window,
}

impl Renderer {
    /// Take ownership of `window` and create the per-slot command buffers and sync objects
    pub fn new(window: Window, config: &RendererConfig) -> VulkanResult<Self> {
        logged(Self::create(window, config), "Renderer creation failed")
    }

    fn create(window: Window, config: &RendererConfig) -> VulkanResult<Self> {
        config.validate().map_err(VulkanError::invalid_operation)?;

        let frames = config.frames_in_flight;
        let device = Arc::clone(window.device());
        let command_pool = CommandPool::new(Arc::clone(&device), device.graphics_family())?;
        let command_buffers = command_pool.allocate_command_buffers(frames as u32)?;
        let frame_sync = (0..frames)
            .map(|_| FrameSync::new(&device))
            .collect::<VulkanResult<Vec<_>>>()?;

        let renderer = Self {
            id: OwnerId::next(),
            cycle: FrameCycle::new(frames),
            active: None,
            clear_color: config.clear_color,
            command_buffers,
            uniforms: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            frame_sync,
            command_pool,
            device,
            window,
        };

        log::info!(
            "Created renderer {} for window {} with {frames} frames in flight",
            renderer.id,
            renderer.window.id()
        );
        Ok(renderer)
    }

    /// Open a frame and bind `shader`
    ///
    /// Blocks until the GPU has finished the work previously submitted from
    /// this frame slot. Dirty uniform buffers attached to `shader` are copied
    /// into this slot's allocation before recording starts.
    pub fn begin(&mut self, shader: &Shader) -> VulkanResult<()> {
        self.window.id().ensure_owns("Shader", shader.window_id())?;
        self.id.ensure_owns("Shader", shader.renderer_id())?;
        let slot = self.cycle.begin()?;

        match self.begin_frame(slot, shader) {
            Ok(frame) => {
                self.active = Some(frame);
                log::trace!("Began frame on slot {slot}");
                Ok(())
            }
            Err(e) => {
                self.cycle.abort();
                log::error!("Failed to begin frame: {e}");
                Err(e)
            }
        }
    }

    fn begin_frame(&mut self, slot: usize, shader: &Shader) -> VulkanResult<ActiveFrame> {
        let sync = &self.frame_sync[slot];
        sync.in_flight.wait(u64::MAX)?;

        let image_available = sync.image_available.handle();
        let (image_index, acquire_status) = self.acquire_image(image_available)?;

        match self.record_frame(slot, image_index, shader) {
            Ok(command_buffer) => Ok(ActiveFrame {
                slot,
                image_index,
                acquire_status,
                command_buffer,
            }),
            Err(e) => {
                self.release_acquired(slot);
                Err(e)
            }
        }
    }

    fn record_frame(&mut self, slot: usize, image_index: u32, shader: &Shader) -> VulkanResult<vk::CommandBuffer> {
        for handle in shader.uniform_handles() {
            if let Some(buffer) = self.uniforms.get_mut(handle.key) {
                if buffer.update(slot) {
                    log::trace!("Flushed uniform buffer into slot {slot}");
                }
            }
        }

        let raw = self.device.handle();
        let command_buffer = self.command_buffers[slot];
        let swapchain = self.window.swapchain()?;
        let framebuffer = swapchain
            .framebuffer(image_index)
            .ok_or_else(|| VulkanError::InitializationFailed(format!("No framebuffer for image {image_index}")))?;
        let extent = swapchain.extent();

        unsafe {
            raw.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            raw.begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.window.render_pass()?.handle())
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            raw.cmd_begin_render_pass(command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
            raw.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, shader.pipeline());
            if let Some(set) = shader.descriptor_set(slot) {
                raw.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    shader.pipeline_layout(),
                    0,
                    &[set],
                    &[],
                );
            }
        }

        Ok(command_buffer)
    }

    /// Undo an acquire whose frame will never be submitted
    ///
    /// The empty submit waits on the slot's image-available semaphore and
    /// signals its fence. The rebuild retires the chain holding the image
    /// that was acquired but never presented.
    fn release_acquired(&mut self, slot: usize) {
        if let Err(e) = self.submit_empty(slot) {
            log::error!("Failed to release frame slot {slot}: {e}");
        }
        if let Err(e) = self.window.recreate_swapchain() {
            log::error!("Failed to rebuild swapchain after releasing slot {slot}: {e}");
        }
    }

    fn submit_empty(&self, slot: usize) -> VulkanResult<()> {
        let sync = &self.frame_sync[slot];
        sync.in_flight.reset()?;

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .build();

        unsafe {
            self.device
                .handle()
                .queue_submit(self.device.graphics_queue(), &[submit_info], sync.in_flight.handle())
        }
        .map_err(VulkanError::Api)
    }

    fn acquire_image(&mut self, image_available: vk::Semaphore) -> VulkanResult<(u32, ChainStatus)> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            if let Some(acquired) = self.window.swapchain()?.acquire_next_image(image_available)? {
                return Ok(acquired);
            }
            self.window.recreate_swapchain()?;
        }
        Err(VulkanError::InitializationFailed(format!(
            "Swapchain still out of date after {MAX_ACQUIRE_ATTEMPTS} rebuilds"
        )))
    }

    fn active_command_buffer(&self, operation: &str) -> VulkanResult<vk::CommandBuffer> {
        self.cycle.ensure_open(operation)?;
        self.active
            .as_ref()
            .map(|frame| frame.command_buffer)
            .ok_or_else(|| VulkanError::invalid_operation(format!("{operation} called with no open frame")))
    }

    /// Bind a vertex buffer at `binding` in the open frame
    pub fn bind_vertex_buffer(&mut self, buffer: &VertexBuffer, binding: u32) -> VulkanResult<()> {
        let command_buffer = self.active_command_buffer("bind_vertex_buffer")?;
        self.id.ensure_owns("VertexBuffer", buffer.owner())?;
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(command_buffer, binding, &[buffer.handle()], &[0]);
        }
        Ok(())
    }

    /// Bind an index buffer in the open frame
    pub fn bind_index_buffer(&mut self, buffer: &IndexBuffer) -> VulkanResult<()> {
        let command_buffer = self.active_command_buffer("bind_index_buffer")?;
        self.id.ensure_owns("IndexBuffer", buffer.owner())?;
        unsafe {
            self.device
                .handle()
                .cmd_bind_index_buffer(command_buffer, buffer.handle(), 0, buffer.index_type());
        }
        Ok(())
    }

    fn set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let extent = self.window.swapchain()?.extent();
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device.handle().cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device.handle().cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
        Ok(())
    }

    /// Draw `vertex_count` vertices from offset 0
    pub fn draw(&mut self, vertex_count: u32) -> VulkanResult<()> {
        let command_buffer = self.active_command_buffer("draw")?;
        self.cycle.record("draw")?;
        self.set_viewport_and_scissor(command_buffer)?;
        unsafe {
            self.device.handle().cmd_draw(command_buffer, vertex_count, 1, 0, 0);
        }
        Ok(())
    }

    /// Draw `index_count` indices from offset 0
    pub fn draw_indexed(&mut self, index_count: u32) -> VulkanResult<()> {
        let command_buffer = self.active_command_buffer("draw_indexed")?;
        self.cycle.record("draw_indexed")?;
        self.set_viewport_and_scissor(command_buffer)?;
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(command_buffer, index_count, 1, 0, 0, 0);
        }
        Ok(())
    }

    /// Close, submit and present the open frame
    ///
    /// A stale swapchain is rebuilt here and never reported as an error. The
    /// frame slot advances whether or not the chain was rebuilt.
    pub fn end(&mut self) -> VulkanResult<()> {
        self.cycle.end()?;
        let Some(frame) = self.active.take() else {
            self.cycle.abort();
            return Err(VulkanError::invalid_operation("end called with no open frame"));
        };

        if let Err(e) = self.submit(&frame) {
            self.release_acquired(frame.slot);
            self.cycle.abort();
            log::error!("Failed to submit frame: {e}");
            return Err(e);
        }

        let status = match self.present(&frame) {
            Ok(status) => status,
            Err(e) => {
                self.cycle.abort();
                log::error!("Failed to present frame: {e}");
                return Err(e);
            }
        };

        let recreate_result = if status.is_stale() || self.window.was_resized() {
            self.window.recreate_swapchain()
        } else {
            Ok(())
        };

        self.cycle.advance();
        log::trace!("Ended frame, next slot {}", self.cycle.current_frame());
        logged(recreate_result, "Swapchain recreation failed")
    }

    /// Abandon the open frame without submitting its commands
    ///
    /// The slot does not advance and the next `begin` reuses it.
    pub fn discard(&mut self) -> VulkanResult<()> {
        self.cycle.ensure_open("discard")?;
        if let Some(frame) = self.active.take() {
            self.release_acquired(frame.slot);
        }
        self.cycle.abort();
        log::debug!("Discarded frame on slot {}", self.cycle.current_frame());
        Ok(())
    }

    fn submit(&self, frame: &ActiveFrame) -> VulkanResult<()> {
        let raw = self.device.handle();
        let sync = &self.frame_sync[frame.slot];

        unsafe {
            raw.cmd_end_render_pass(frame.command_buffer);
            raw.end_command_buffer(frame.command_buffer).map_err(VulkanError::Api)?;
        }

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        sync.in_flight.reset()?;
        unsafe { raw.queue_submit(self.device.graphics_queue(), &[submit_info], sync.in_flight.handle()) }
            .map_err(VulkanError::Api)
    }

    fn present(&self, frame: &ActiveFrame) -> VulkanResult<ChainStatus> {
        let present_status = self.window.swapchain()?.present(
            self.device.present_queue(),
            frame.image_index,
            self.frame_sync[frame.slot].render_finished.handle(),
        )?;
        Ok(frame.acquire_status.merge(present_status))
    }

    /// Allocate a uniform buffer with one copy per frame slot
    pub fn create_uniform_buffer(&mut self, data: &[u8]) -> VulkanResult<UniformBufferHandle> {
        if data.is_empty() {
            return Err(VulkanError::invalid_operation("Uniform buffer data cannot be empty"));
        }
        let buffer = logged(
            UniformBuffer::new(&self.device, self.frames_in_flight(), data),
            "Uniform buffer creation failed",
        )?;
        let key = self.uniforms.insert(buffer);
        log::debug!("Created uniform buffer of {} bytes for renderer {}", data.len(), self.id);
        Ok(UniformBufferHandle { key, owner: self.id })
    }

    /// Typed form of [`Renderer::create_uniform_buffer`]
    pub fn create_uniform_buffer_typed<T: bytemuck::Pod>(&mut self, value: &T) -> VulkanResult<UniformBufferHandle> {
        self.create_uniform_buffer(bytemuck::bytes_of(value))
    }

    /// Replace a uniform buffer's contents; each slot picks it up at its next `begin`
    pub fn set_uniform(&mut self, handle: UniformBufferHandle, data: &[u8]) -> VulkanResult<()> {
        self.uniform_buffer_mut(handle)?.set(data)
    }

    /// Typed form of [`Renderer::set_uniform`]
    pub fn set_uniform_typed<T: bytemuck::Pod>(&mut self, handle: UniformBufferHandle, value: &T) -> VulkanResult<()> {
        self.uniform_buffer_mut(handle)?.set_typed(value)
    }

    /// Look up a uniform buffer
    pub fn uniform_buffer(&self, handle: UniformBufferHandle) -> VulkanResult<&UniformBuffer> {
        self.id.ensure_owns("UniformBuffer", handle.owner)?;
        self.uniforms
            .get(handle.key)
            .ok_or_else(|| VulkanError::invalid_operation("Uniform buffer handle is no longer valid"))
    }

    /// Look up a uniform buffer for modification
    pub fn uniform_buffer_mut(&mut self, handle: UniformBufferHandle) -> VulkanResult<&mut UniformBuffer> {
        self.id.ensure_owns("UniformBuffer", handle.owner)?;
        self.uniforms
            .get_mut(handle.key)
            .ok_or_else(|| VulkanError::invalid_operation("Uniform buffer handle is no longer valid"))
    }

    /// Load an image file into a sampled texture
    pub fn create_sampler(&mut self, path: impl AsRef<Path>, filter: Filter, wrap: Wrap) -> VulkanResult<SamplerHandle> {
        let path = path.as_ref();
        let sampler = logged(
            Sampler::load(&self.device, &self.command_pool, path, filter, wrap),
            "Sampler creation failed",
        )?;
        let key = self.samplers.insert(sampler);
        log::info!("Loaded texture {} ({filter:?}, {wrap:?})", path.display());
        Ok(SamplerHandle { key, owner: self.id })
    }

    /// Look up a sampler
    pub fn sampler(&self, handle: SamplerHandle) -> VulkanResult<&Sampler> {
        self.id.ensure_owns("Sampler", handle.owner)?;
        self.samplers
            .get(handle.key)
            .ok_or_else(|| VulkanError::invalid_operation("Sampler handle is no longer valid"))
    }

    /// Request a new window size; the swapchain follows after the next frame
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.window.resize(width, height);
    }

    /// Block until all submitted work has finished
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    /// Identity used to validate buffers, handles and shaders
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Slot the next or open frame uses
    pub fn current_frame(&self) -> usize {
        self.cycle.current_frame()
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.cycle.frames_in_flight()
    }

    /// Frames completed so far
    pub fn frames_completed(&self) -> u64 {
        self.cycle.completed()
    }

    /// Position in the begin/end protocol
    pub fn frame_state(&self) -> FrameState {
        self.cycle.state()
    }

    /// Window being rendered to
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Window being rendered to, for polling and resizing
    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    /// Logical device
    pub fn device(&self) -> &Arc<LogicalDevice> {
        &self.device
    }

    /// Whether a slot's fence is signaled, so the next `begin` on it will not block
    pub fn slot_ready(&self, slot: usize) -> VulkanResult<bool> {
        self.frame_sync
            .get(slot)
            .ok_or_else(|| VulkanError::invalid_operation(format!("No frame slot {slot}")))?
            .in_flight
            .is_signaled()
    }

    pub(crate) fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Drain before the pool, sync objects and arenas go away
        drained(self.device.wait_idle(), "renderer");
        log::info!("Destroyed renderer {} after {} frames", self.id, self.cycle.completed());
    }
}

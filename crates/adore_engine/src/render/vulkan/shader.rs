//! Shader modules and graphics pipelines
//!
//! A [`Shader`] is the compiled pipeline for one [`LayoutDescriptor`] plus one
//! descriptor set per frame slot. Slot `i` of every set points at slot `i` of
//! each attached uniform buffer; samplers are immutable and shared by all
//! slots. Viewport and scissor are dynamic and set by the renderer per draw.

use ash::vk;
use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::context::{drained, logged};
use super::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetWriter};
use super::renderer::Renderer;
use super::texture::SamplerHandle;
use super::uniform_buffer::UniformBufferHandle;
use super::vertex_layout::{attribute_descriptions, binding_descriptions, vk_stage};
use super::{LogicalDevice, VulkanError, VulkanResult};
use crate::render::layout::{LayoutDescriptor, ResourceKind, ShaderStage};
use crate::render::ownership::OwnerId;

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// One precompiled SPIR-V file and the stage it runs in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderModuleSource {
    /// Pipeline stage
    pub stage: ShaderStage,
    /// Path to the `.spv` file
    pub path: PathBuf,
}

impl ShaderModuleSource {
    /// Describe a shader module file
    pub fn new(stage: ShaderStage, path: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            path: path.into(),
        }
    }
}

/// Resource to bind when the shader is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformResource {
    /// Uniform buffer at a binding
    Buffer {
        /// Binding index
        binding: u32,
        /// Buffer in the renderer's arena
        handle: UniformBufferHandle,
    },
    /// Texture sampler at a binding
    Sampler {
        /// Binding index
        binding: u32,
        /// Sampler in the renderer's arena
        handle: SamplerHandle,
    },
}

/// Read SPIR-V words from a file
pub fn read_spirv(path: &Path) -> VulkanResult<Vec<u32>> {
    let load_error = |reason: String| VulkanError::ResourceLoad {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| load_error(e.to_string()))?;
    ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|e| load_error(format!("invalid SPIR-V: {e}")))
}

/// Shader module wrapper with RAII cleanup
struct ShaderModule {
    device: Arc<LogicalDevice>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    fn load(device: Arc<LogicalDevice>, source: &ShaderModuleSource) -> VulkanResult<Self> {
        let code = read_spirv(&source.path)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module =
            unsafe { device.handle().create_shader_module(&create_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            device,
            module,
            stage: source.stage,
        })
    }

    fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk_stage(self.stage))
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
    }
}

/// Compiled pipeline with per-frame descriptor sets
pub struct Shader {
    window: OwnerId,
    renderer: OwnerId,
    layout: LayoutDescriptor,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    descriptor_sets: Vec<vk::DescriptorSet>,
    uniforms: Vec<(u32, UniformBufferHandle)>,
    samplers: Vec<(u32, SamplerHandle)>,
    _descriptor_pool: Option<DescriptorPool>,
    _set_layout: DescriptorSetLayout,
    device: Arc<LogicalDevice>,
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("window", &self.window)
            .field("renderer", &self.renderer)
            .field("layout", &self.layout)
            .field("pipeline", &self.pipeline)
            .field("pipeline_layout", &self.pipeline_layout)
            .finish_non_exhaustive()
    }
}

impl Shader {
    /// Compile `modules` into a pipeline targeting `renderer`'s window
    pub fn new(
        renderer: &Renderer,
        modules: &[ShaderModuleSource],
        layout: LayoutDescriptor,
        resources: &[UniformResource],
    ) -> VulkanResult<Self> {
        logged(Self::create(renderer, modules, layout, resources), "Shader creation failed")
    }

    fn create(
        renderer: &Renderer,
        modules: &[ShaderModuleSource],
        layout: LayoutDescriptor,
        resources: &[UniformResource],
    ) -> VulkanResult<Self> {
        layout.validate().map_err(VulkanError::invalid_operation)?;
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            if !modules.iter().any(|module| module.stage == stage) {
                return Err(VulkanError::invalid_operation(format!("Shader has no {stage:?} module")));
            }
        }

        let device = Arc::clone(renderer.device());
        let frames = renderer.frames_in_flight() as u32;
        let render_pass = renderer.window().render_pass()?.handle();

        // Read every file before creating any GPU object
        let modules = modules
            .iter()
            .map(|source| ShaderModule::load(Arc::clone(&device), source))
            .collect::<VulkanResult<Vec<_>>>()?;

        let set_layout = DescriptorSetLayout::new(Arc::clone(&device), &layout)?;
        // A layout without resources binds an empty set and needs no pool
        let (descriptor_pool, descriptor_sets) = if layout.resources.is_empty() {
            (None, Vec::new())
        } else {
            let pool = DescriptorPool::new(Arc::clone(&device), &layout, frames)?;
            let set_layouts = vec![set_layout.handle(); frames as usize];
            let sets = pool.allocate(&set_layouts)?;
            (Some(pool), sets)
        };

        let layout_handles = [set_layout.handle()];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&layout_handles);
        let pipeline_layout =
            unsafe { device.handle().create_pipeline_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        let pipeline = match Self::build_pipeline(
            &device,
            render_pass,
            &modules,
            &layout,
            pipeline_layout,
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { device.handle().destroy_pipeline_layout(pipeline_layout, None) };
                return Err(e);
            }
        };

        let mut shader = Self {
            window: renderer.window().id(),
            renderer: renderer.id(),
            layout,
            pipeline,
            pipeline_layout,
            descriptor_sets,
            uniforms: Vec::new(),
            samplers: Vec::new(),
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            device,
        };

        for resource in resources {
            match *resource {
                UniformResource::Buffer { binding, handle } => shader.attach_uniform(renderer, binding, handle)?,
                UniformResource::Sampler { binding, handle } => shader.attach_sampler(renderer, binding, handle)?,
            }
        }

        let missing = shader.layout.missing_resources(shader.attached_bindings());
        if !missing.is_empty() {
            return Err(VulkanError::invalid_operation(format!(
                "Shader declares resource bindings {missing:?} with nothing attached"
            )));
        }

        log::info!(
            "Created shader with {} stages and {} resources for window {}",
            modules.len(),
            shader.layout.resources.len(),
            shader.window
        );
        Ok(shader)
    }

    fn build_pipeline(
        device: &LogicalDevice,
        render_pass: vk::RenderPass,
        modules: &[ShaderModule],
        layout: &LayoutDescriptor,
        pipeline_layout: vk::PipelineLayout,
    ) -> VulkanResult<vk::Pipeline> {
        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> =
            modules.iter().map(ShaderModule::stage_info).collect();

        let bindings = binding_descriptions(layout);
        let attributes = attribute_descriptions(layout);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the rectangles are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(pipeline_layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, err)| VulkanError::Api(err))?;

        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("Driver returned no pipeline".to_string()))
    }

    fn expect_resource(&self, binding: u32, kind: ResourceKind) -> VulkanResult<()> {
        match self.layout.resource(binding) {
            Some(resource) if resource.kind == kind => Ok(()),
            Some(resource) => Err(VulkanError::invalid_operation(format!(
                "Binding {binding} is declared as {:?}, not {kind:?}",
                resource.kind
            ))),
            None => Err(VulkanError::invalid_operation(format!(
                "Binding {binding} is not declared by this shader"
            ))),
        }
    }

    /// Point `binding` at a uniform buffer in every frame slot's set
    pub fn attach_uniform(&mut self, renderer: &Renderer, binding: u32, handle: UniformBufferHandle) -> VulkanResult<()> {
        renderer.id().ensure_owns("Shader", self.renderer)?;
        self.expect_resource(binding, ResourceKind::Buffer)?;
        let buffer = renderer.uniform_buffer(handle)?;

        let mut writer = DescriptorSetWriter::new();
        for (slot, &set) in self.descriptor_sets.iter().enumerate() {
            let info = buffer
                .descriptor_info(slot)
                .ok_or_else(|| VulkanError::invalid_operation("Uniform buffer has fewer slots than the shader"))?;
            writer = writer.write_buffer(set, binding, info);
        }
        writer.update(&self.device);

        self.uniforms.retain(|(existing, _)| *existing != binding);
        self.uniforms.push((binding, handle));
        log::debug!("Attached uniform buffer at binding {binding}");
        Ok(())
    }

    /// Point `binding` at a sampler in every frame slot's set
    pub fn attach_sampler(&mut self, renderer: &Renderer, binding: u32, handle: SamplerHandle) -> VulkanResult<()> {
        renderer.id().ensure_owns("Shader", self.renderer)?;
        self.expect_resource(binding, ResourceKind::Sampler)?;
        let info = renderer.sampler(handle)?.descriptor_info();

        let writer = self
            .descriptor_sets
            .iter()
            .fold(DescriptorSetWriter::new(), |writer, &set| writer.write_image(set, binding, info));
        writer.update(&self.device);

        self.samplers.retain(|(existing, _)| *existing != binding);
        self.samplers.push((binding, handle));
        log::debug!("Attached sampler at binding {binding}");
        Ok(())
    }

    /// Window the pipeline's render pass belongs to
    pub fn window_id(&self) -> OwnerId {
        self.window
    }

    /// Renderer whose arena holds the attached resources
    pub fn renderer_id(&self) -> OwnerId {
        self.renderer
    }

    /// Layout the shader was built from
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    fn attached_bindings(&self) -> impl Iterator<Item = u32> + '_ {
        let uniforms = self.uniforms.iter().map(|&(binding, _)| binding);
        uniforms.chain(self.samplers.iter().map(|&(binding, _)| binding))
    }

    /// Uniform buffers flushed when a frame begins with this shader
    pub fn uniform_handles(&self) -> impl Iterator<Item = UniformBufferHandle> + '_ {
        self.uniforms.iter().map(|&(_, handle)| handle)
    }

    /// Pipeline handle
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout handle
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    /// Descriptor set for a frame slot
    pub fn descriptor_set(&self, slot: usize) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.get(slot).copied()
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        drained(self.device.wait_graphics_idle(), "shader");
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
            self.device.handle().destroy_pipeline_layout(self.pipeline_layout, None);
        }
        log::debug!("Destroyed shader for window {}", self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_bytecode_is_resource_load_error() {
        let err = read_spirv(Path::new("/nonexistent/shader.vert.spv")).unwrap_err();
        assert!(err.is_resource_load());
        assert!(err.to_string().contains("shader.vert.spv"));
    }

    #[test]
    fn test_malformed_bytecode_is_resource_load_error() {
        let path = std::env::temp_dir().join(format!("adore_bad_{}.spv", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let result = read_spirv(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.unwrap_err().is_resource_load());
    }

    #[test]
    fn test_valid_header_reads_words() {
        let path = std::env::temp_dir().join(format!("adore_min_{}.spv", std::process::id()));
        let words: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];
        std::fs::write(&path, bytemuck::cast_slice::<u32, u8>(&words)).unwrap();
        let code = read_spirv(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(code, words);
    }

    #[test]
    fn test_module_source_from_toml() {
        let source: ShaderModuleSource =
            toml::from_str("stage = \"Fragment\"\npath = \"target/shaders/quad.frag.spv\"").unwrap();
        assert_eq!(source.stage, ShaderStage::Fragment);
        assert_eq!(source.path, PathBuf::from("target/shaders/quad.frag.spv"));
    }
}

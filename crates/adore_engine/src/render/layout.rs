//! Backend-agnostic pipeline layout description
//!
//! A [`LayoutDescriptor`] is plain data: which vertex attributes the
//! pipeline reads, how the vertex bindings are strided, and which resources
//! (uniform buffers and samplers) the shaders expect at which binding. The
//! Vulkan backend turns it into vertex input state and a descriptor set
//! layout. It derives serde so it can live next to the SPIR-V in a config
//! file.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Shader stage a module or resource belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

/// Kind of resource bound through a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Uniform buffer, one allocation per frame-in-flight slot
    Buffer,
    /// Combined image sampler, shared by every slot
    Sampler,
}

/// Format of a single vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AttributeFormat {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Double,
    DVec2,
    DVec3,
    DVec4,
}

impl AttributeFormat {
    /// Number of scalar components
    pub const fn components(self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::UInt | Self::Double => 1,
            Self::Vec2 | Self::IVec2 | Self::UVec2 | Self::DVec2 => 2,
            Self::Vec3 | Self::IVec3 | Self::UVec3 | Self::DVec3 => 3,
            Self::Vec4 | Self::IVec4 | Self::UVec4 | Self::DVec4 => 4,
        }
    }

    /// Size of one attribute value in bytes
    pub const fn size_in_bytes(self) -> u32 {
        let scalar = match self {
            Self::Double | Self::DVec2 | Self::DVec3 | Self::DVec4 => 8,
            _ => 4,
        };
        scalar * self.components()
    }
}

/// One vertex attribute read by the vertex stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexAttribute {
    /// Vertex buffer binding the attribute is sourced from
    pub binding: u32,
    /// Shader input location
    pub location: u32,
    /// Byte offset inside one vertex
    pub offset: u32,
    /// Attribute format
    pub format: AttributeFormat,
}

/// Stride of one vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexBinding {
    /// Binding index used by `Renderer::bind_vertex_buffer`
    pub binding: u32,
    /// Bytes between consecutive vertices
    pub stride: u32,
}

/// One resource the shaders declare in descriptor set 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBinding {
    /// Binding index inside the set
    pub binding: u32,
    /// Array size of the binding
    pub count: u32,
    /// Stage that reads the resource
    pub stage: ShaderStage,
    /// Buffer or sampler
    pub kind: ResourceKind,
}

/// Complete layout description for one pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    /// Vertex attributes
    #[serde(default)]
    pub attributes: Vec<VertexAttribute>,
    /// Vertex buffer bindings
    #[serde(default)]
    pub bindings: Vec<VertexBinding>,
    /// Descriptor resources
    #[serde(default)]
    pub resources: Vec<ResourceBinding>,
}

impl LayoutDescriptor {
    /// Create an empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex buffer binding
    pub fn with_binding(mut self, binding: u32, stride: u32) -> Self {
        self.bindings.push(VertexBinding { binding, stride });
        self
    }

    /// Add a vertex attribute
    pub fn with_attribute(mut self, binding: u32, location: u32, offset: u32, format: AttributeFormat) -> Self {
        self.attributes.push(VertexAttribute {
            binding,
            location,
            offset,
            format,
        });
        self
    }

    /// Add a descriptor resource with a count of one
    pub fn with_resource(mut self, binding: u32, stage: ShaderStage, kind: ResourceKind) -> Self {
        self.resources.push(ResourceBinding {
            binding,
            count: 1,
            stage,
            kind,
        });
        self
    }

    /// Look up the resource declared at `binding`
    pub fn resource(&self, binding: u32) -> Option<&ResourceBinding> {
        self.resources.iter().find(|r| r.binding == binding)
    }

    /// Declared resource bindings absent from `attached`, in declaration order
    pub fn missing_resources(&self, attached: impl IntoIterator<Item = u32>) -> Vec<u32> {
        let attached: HashSet<u32> = attached.into_iter().collect();
        self.resources
            .iter()
            .map(|resource| resource.binding)
            .filter(|binding| !attached.contains(binding))
            .collect()
    }

    /// Check the layout for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        let mut binding_ids = HashSet::new();
        for binding in &self.bindings {
            if binding.stride == 0 {
                return Err(format!("Vertex binding {} has zero stride", binding.binding));
            }
            if !binding_ids.insert(binding.binding) {
                return Err(format!("Vertex binding {} declared twice", binding.binding));
            }
        }

        let mut locations = HashSet::new();
        for attribute in &self.attributes {
            let Some(binding) = self.bindings.iter().find(|b| b.binding == attribute.binding) else {
                return Err(format!(
                    "Attribute at location {} refers to undeclared binding {}",
                    attribute.location, attribute.binding
                ));
            };
            let end = attribute.offset.checked_add(attribute.format.size_in_bytes());
            if end.map_or(true, |end| end > binding.stride) {
                return Err(format!(
                    "Attribute at location {} overruns the {}-byte stride of binding {}",
                    attribute.location, binding.stride, binding.binding
                ));
            }
            if !locations.insert(attribute.location) {
                return Err(format!("Attribute location {} declared twice", attribute.location));
            }
        }

        let mut resource_ids = HashSet::new();
        for resource in &self.resources {
            if resource.count != 1 {
                return Err(format!(
                    "Resource binding {} has a count of {}; only single descriptors are supported",
                    resource.binding, resource.count
                ));
            }
            if !resource_ids.insert(resource.binding) {
                return Err(format!("Resource binding {} declared twice", resource.binding));
            }
        }

        Ok(())
    }
}

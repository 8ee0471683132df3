//! Vulkan vertex input state from a [`LayoutDescriptor`]

use ash::vk;

use crate::render::layout::{AttributeFormat, LayoutDescriptor, ResourceKind, ShaderStage};

/// Native format for an attribute format
pub const fn vk_format(format: AttributeFormat) -> vk::Format {
    match format {
        AttributeFormat::Float => vk::Format::R32_SFLOAT,
        AttributeFormat::Vec2 => vk::Format::R32G32_SFLOAT,
        AttributeFormat::Vec3 => vk::Format::R32G32B32_SFLOAT,
        AttributeFormat::Vec4 => vk::Format::R32G32B32A32_SFLOAT,
        AttributeFormat::Int => vk::Format::R32_SINT,
        AttributeFormat::IVec2 => vk::Format::R32G32_SINT,
        AttributeFormat::IVec3 => vk::Format::R32G32B32_SINT,
        AttributeFormat::IVec4 => vk::Format::R32G32B32A32_SINT,
        AttributeFormat::UInt => vk::Format::R32_UINT,
        AttributeFormat::UVec2 => vk::Format::R32G32_UINT,
        AttributeFormat::UVec3 => vk::Format::R32G32B32_UINT,
        AttributeFormat::UVec4 => vk::Format::R32G32B32A32_UINT,
        AttributeFormat::Double => vk::Format::R64_SFLOAT,
        AttributeFormat::DVec2 => vk::Format::R64G64_SFLOAT,
        AttributeFormat::DVec3 => vk::Format::R64G64B64_SFLOAT,
        AttributeFormat::DVec4 => vk::Format::R64G64B64A64_SFLOAT,
    }
}

/// Native stage flag for a shader stage
pub const fn vk_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}

/// Native descriptor type for a resource kind
pub const fn vk_descriptor_type(kind: ResourceKind) -> vk::DescriptorType {
    match kind {
        ResourceKind::Buffer => vk::DescriptorType::UNIFORM_BUFFER,
        ResourceKind::Sampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

/// Per-vertex binding descriptions
pub fn binding_descriptions(layout: &LayoutDescriptor) -> Vec<vk::VertexInputBindingDescription> {
    layout
        .bindings
        .iter()
        .map(|binding| vk::VertexInputBindingDescription {
            binding: binding.binding,
            stride: binding.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        })
        .collect()
}

/// Attribute descriptions
pub fn attribute_descriptions(layout: &LayoutDescriptor) -> Vec<vk::VertexInputAttributeDescription> {
    layout
        .attributes
        .iter()
        .map(|attribute| vk::VertexInputAttributeDescription {
            binding: attribute.binding,
            location: attribute.location,
            format: vk_format(attribute.format),
            offset: attribute.offset,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_formats() {
        assert_eq!(vk_format(AttributeFormat::Float), vk::Format::R32_SFLOAT);
        assert_eq!(vk_format(AttributeFormat::Vec2), vk::Format::R32G32_SFLOAT);
        assert_eq!(vk_format(AttributeFormat::Vec3), vk::Format::R32G32B32_SFLOAT);
        assert_eq!(vk_format(AttributeFormat::Vec4), vk::Format::R32G32B32A32_SFLOAT);
    }

    #[test]
    fn test_integer_and_double_formats() {
        assert_eq!(vk_format(AttributeFormat::IVec3), vk::Format::R32G32B32_SINT);
        assert_eq!(vk_format(AttributeFormat::UVec2), vk::Format::R32G32_UINT);
        assert_eq!(vk_format(AttributeFormat::DVec4), vk::Format::R64G64B64A64_SFLOAT);
    }

    #[test]
    fn test_descriptor_types() {
        assert_eq!(vk_descriptor_type(ResourceKind::Buffer), vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(
            vk_descriptor_type(ResourceKind::Sampler),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(vk_stage(ShaderStage::Fragment), vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_descriptions_follow_layout() {
        let layout = LayoutDescriptor::new()
            .with_binding(0, 20)
            .with_attribute(0, 0, 0, AttributeFormat::Vec3)
            .with_attribute(0, 1, 12, AttributeFormat::Vec2);

        let bindings = binding_descriptions(&layout);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].stride, 20);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);

        let attributes = attribute_descriptions(&layout);
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }
}

//! Rendering: backend selection, layout description and the Vulkan backend

pub mod api;
pub mod layout;
pub mod ownership;
pub mod vulkan;

#[cfg(test)]
mod tests;

pub use api::{Context, ContextBackend, GraphicsApi};
pub use layout::{AttributeFormat, LayoutDescriptor, ResourceBinding, ResourceKind, ShaderStage, VertexAttribute, VertexBinding};
pub use ownership::OwnerId;

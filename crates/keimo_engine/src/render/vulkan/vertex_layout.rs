//! Vulkan vertex input descriptions
//!
//! Mesh types stay backend-agnostic; the vertex input state is described here.

use ash::vk;

use crate::render::primitives::Vertex;

/// One attribute of an interleaved vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Attribute format
    pub format: vk::Format,
    /// Byte offset inside the vertex
    pub offset: u32,
}

/// Interleaved vertex type bound at binding 0
pub trait VertexLayout {
    /// Bytes between consecutive vertices
    const STRIDE: u32;

    /// Attributes in location order
    fn attributes() -> &'static [VertexAttribute];

    /// Per-vertex binding description
    fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::STRIDE,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for pipeline creation
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        Self::attributes()
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                binding: 0,
                location: attribute.location,
                format: attribute.format,
                offset: attribute.offset,
            })
            .collect()
    }
}

const VERTEX_ATTRIBUTES: [VertexAttribute; 3] = [
    // position
    VertexAttribute {
        location: 0,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: 0,
    },
    // color
    VertexAttribute {
        location: 1,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: 12,
    },
    // texture coordinate
    VertexAttribute {
        location: 2,
        format: vk::Format::R32G32_SFLOAT,
        offset: 24,
    },
];

impl VertexLayout for Vertex {
    const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    fn attributes() -> &'static [VertexAttribute] {
        &VERTEX_ATTRIBUTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_matches_struct() {
        assert_eq!(Vertex::STRIDE, 32);
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let offsets: Vec<u32> = Vertex::attribute_descriptions().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(
            std::mem::size_of::<[f32; 3]>() * 2,
            VERTEX_ATTRIBUTES[2].offset as usize
        );
    }

    #[test]
    fn test_attribute_locations_are_sequential() {
        for (i, attribute) in Vertex::attributes().iter().enumerate() {
            assert_eq!(attribute.location, i as u32);
        }
    }
}

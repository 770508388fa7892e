//! Indexed geometry on the GPU

use std::path::Path;

use ash::vk;

use crate::assets::{AssetError, ObjDecoder};
use crate::render::primitives::{Index, MeshData};
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::context::{VulkanError, VulkanResult};
use crate::render::vulkan::transfer::TransferContext;

/// Device-local vertex buffer and 16-bit index buffer
pub struct Model {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    vertex_count: usize,
}

impl Model {
    /// Load an OBJ file, deduplicate its corners and upload the result
    pub fn load<P: AsRef<Path>>(transfer: &TransferContext, path: P) -> VulkanResult<Self> {
        let corners = ObjDecoder::load(path)?;
        let mesh = MeshData::from_corners(&corners).map_err(|e| match e {
            AssetError::InvalidMesh(reason) => VulkanError::InvalidOperation { reason },
            other => VulkanError::Asset(other),
        })?;
        Self::from_mesh(transfer, &mesh)
    }

    /// Upload already deduplicated geometry
    pub fn from_mesh(transfer: &TransferContext, mesh: &MeshData) -> VulkanResult<Self> {
        check_mesh(mesh)?;

        let vertex_buffer = transfer.upload(mesh.vertex_bytes(), vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let index_buffer = transfer.upload(mesh.index_bytes(), vk::BufferUsageFlags::INDEX_BUFFER)?;

        log::info!(
            "Model uploaded: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
            vertex_count: mesh.vertices.len(),
        })
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    /// Index buffer handle
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Number of unique vertices
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }
}

fn check_mesh(mesh: &MeshData) -> VulkanResult<()> {
    let max_vertices = usize::from(Index::MAX) + 1;
    if mesh.vertices.is_empty() || mesh.indices.is_empty() {
        return Err(VulkanError::InvalidOperation {
            reason: "mesh has no geometry".to_string(),
        });
    }
    if mesh.vertices.len() > max_vertices {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "{} vertices exceed the {} addressable by 16-bit indices",
                mesh.vertices.len(),
                max_vertices
            ),
        });
    }
    if let Some(&bad) = mesh.indices.iter().find(|&&i| usize::from(i) >= mesh.vertices.len()) {
        return Err(VulkanError::InvalidOperation {
            reason: format!("index {} out of range for {} vertices", bad, mesh.vertices.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::primitives::Vertex;

    #[test]
    fn test_quad_passes_checks() {
        assert!(check_mesh(&MeshData::quad()).is_ok());
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let empty = MeshData {
            vertices: Vec::new(),
            indices: Vec::new(),
        };
        assert!(matches!(check_mesh(&empty), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let mut mesh = MeshData::quad();
        mesh.indices[5] = 4;
        assert!(matches!(check_mesh(&mesh), Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_too_many_vertices_is_rejected() {
        let vertex = Vertex::new([0.0; 3], [1.0; 3], [0.0; 2]);
        let mesh = MeshData {
            vertices: vec![vertex; 65537],
            indices: vec![0, 1, 2],
        };
        assert!(matches!(check_mesh(&mesh), Err(VulkanError::InvalidOperation { .. })));
    }
}

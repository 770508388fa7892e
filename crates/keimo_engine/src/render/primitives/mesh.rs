//! Mesh representation for 3D models
//!
//! `Vertex` is the engine's single vertex record; `MeshData` is the
//! CPU-side, deduplicated vertex/index pair that a `Model` uploads.
//! Vulkan input layout lives in `render::vulkan::vertex_layout`.

use std::collections::HashMap;

use crate::assets::AssetError;

/// Vertex with position, color, and texture coordinate.
///
/// Implements `Hash` and `Eq` over the bit patterns of its floats so that
/// identical corners collapse to one index during deduplication.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],

    /// Linear RGB color multiplied with the sampled texture
    pub color: [f32; 3],

    /// Texture coordinates, V pointing down the image
    pub tex_coord: [f32; 2],
}

// Only f32 arrays, no padding
unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

// Bitwise equality; decoded meshes carry no NaNs
impl Eq for Vertex {}

impl std::hash::Hash for Vertex {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for value in self.position.iter().chain(&self.color).chain(&self.tex_coord) {
            value.to_bits().hash(state);
        }
    }
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }
}

/// Index type used by every index buffer in the engine
pub type Index = u16;

/// Deduplicated geometry ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshData {
    /// Unique vertices in first-seen order
    pub vertices: Vec<Vertex>,

    /// Triangle list indices into `vertices`
    pub indices: Vec<Index>,
}

impl MeshData {
    /// Build from a triangle list with one vertex per face corner.
    ///
    /// The first occurrence of a vertex takes the next index; later equal
    /// corners reuse it. Fails when the mesh needs more unique vertices than a
    /// 16-bit index can address, or when the corner count is not a multiple of 3.
    pub fn from_corners(corners: &[Vertex]) -> Result<Self, AssetError> {
        if corners.len() % 3 != 0 {
            return Err(AssetError::InvalidMesh(format!(
                "{} corners do not form whole triangles",
                corners.len()
            )));
        }

        let mut unique: HashMap<Vertex, Index> = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(corners.len());

        for corner in corners {
            let index = match unique.get(corner) {
                Some(&index) => index,
                None => {
                    let index = Index::try_from(vertices.len()).map_err(|_| {
                        AssetError::InvalidMesh(format!(
                            "more than {} unique vertices",
                            usize::from(Index::MAX) + 1
                        ))
                    })?;
                    unique.insert(*corner, index);
                    vertices.push(*corner);
                    index
                }
            };
            indices.push(index);
        }

        log::debug!(
            "Deduplicated {} corners into {} vertices",
            corners.len(),
            vertices.len()
        );

        Ok(Self { vertices, indices })
    }

    /// Textured quad in the XY plane used when no model is configured
    pub fn quad() -> Self {
        Self {
            vertices: vec![
                Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
                Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
                Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
                Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0], [1.0, 1.0]),
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    /// Vertex data as raw bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as raw bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Number of indices as the draw call expects it
    pub fn index_count(&self) -> u32 {
        // from_corners bounds this well below u32::MAX
        self.indices.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_corners() -> Vec<Vertex> {
        let quad = MeshData::quad();
        quad.indices.iter().map(|&i| quad.vertices[usize::from(i)]).collect()
    }

    #[test]
    fn test_dedup_recovers_quad() {
        let mesh = MeshData::from_corners(&quad_corners()).expect("valid mesh");
        assert_eq!(mesh, MeshData::quad());
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let corners = quad_corners();
        let first = MeshData::from_corners(&corners).expect("valid mesh");
        let second = MeshData::from_corners(&corners).expect("valid mesh");
        assert_eq!(first.indices.len(), second.indices.len());
        assert_eq!(first.vertex_bytes(), second.vertex_bytes());
        assert_eq!(first.index_bytes(), second.index_bytes());
    }

    #[test]
    fn test_first_occurrence_wins() {
        let a = Vertex::new([0.0; 3], [1.0; 3], [0.0, 0.0]);
        let b = Vertex::new([1.0, 0.0, 0.0], [1.0; 3], [1.0, 0.0]);
        let c = Vertex::new([0.0, 1.0, 0.0], [1.0; 3], [0.0, 1.0]);
        let mesh = MeshData::from_corners(&[b, a, c, a, c, b]).expect("valid mesh");
        assert_eq!(mesh.vertices, vec![b, a, c]);
        assert_eq!(mesh.indices, vec![0, 1, 2, 1, 2, 0]);
    }

    #[test]
    fn test_color_participates_in_identity() {
        let red = Vertex::new([0.0; 3], [1.0, 0.0, 0.0], [0.0, 0.0]);
        let blue = Vertex::new([0.0; 3], [0.0, 0.0, 1.0], [0.0, 0.0]);
        let mesh = MeshData::from_corners(&[red, blue, red]).expect("valid mesh");
        assert_eq!(mesh.vertices.len(), 2);
    }

    #[test]
    fn test_quad_byte_sizes() {
        let quad = MeshData::quad();
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(quad.vertex_bytes().len(), 4 * std::mem::size_of::<Vertex>());
        assert_eq!(quad.index_bytes().len(), 6 * 2);
        assert_eq!(quad.index_count(), 6);
    }

    #[test]
    fn test_quad_content() {
        let quad = MeshData::quad();
        assert_eq!(quad.indices, vec![0, 1, 2, 2, 3, 0]);

        let expected: Vec<u8> = [0u16, 1, 2, 2, 3, 0].iter().flat_map(|i| i.to_ne_bytes()).collect();
        assert_eq!(quad.index_bytes(), expected.as_slice());

        let positions: Vec<[f32; 3]> = quad.vertices.iter().map(|v| v.position).collect();
        assert_eq!(
            positions,
            vec![[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.5, 0.5, 0.0], [-0.5, 0.5, 0.0]]
        );
        let tex_coords: Vec<[f32; 2]> = quad.vertices.iter().map(|v| v.tex_coord).collect();
        assert_eq!(tex_coords, vec![[1.0, 0.0], [0.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
    }

    #[test]
    fn test_partial_triangle_rejected() {
        let v = Vertex::new([0.0; 3], [1.0; 3], [0.0; 2]);
        assert!(matches!(MeshData::from_corners(&[v, v]), Err(AssetError::InvalidMesh(_))));
    }

    #[test]
    fn test_index_overflow_rejected() {
        let corners: Vec<Vertex> = (0..65_539u32)
            .map(|i| Vertex::new([i as f32, 0.0, 0.0], [1.0; 3], [0.0; 2]))
            .collect();
        assert!(matches!(MeshData::from_corners(&corners), Err(AssetError::InvalidMesh(_))));
    }
}

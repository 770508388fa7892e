//! OBJ file loader for 3D models
//!
//! Produces one `Vertex` per triangle corner; deduplication into an indexed
//! mesh is `MeshData::from_corners`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::assets::AssetError;
use crate::render::primitives::Vertex;

/// Wavefront OBJ decoder backed by `tobj`
pub struct ObjDecoder;

impl ObjDecoder {
    /// Load an OBJ file and return its triangle corners
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<Vertex>, AssetError> {
        let path = path.as_ref();
        log::debug!("Loading OBJ from: {:?}", path);

        let mut reader = BufReader::new(File::open(path)?);
        let corners = Self::decode(&mut reader)
            .map_err(|e| AssetError::LoadFailed(format!("{}: {}", path.display(), e)))?;

        log::info!("Loaded {} triangles from {:?}", corners.len() / 3, path);
        Ok(corners)
    }

    /// Decode OBJ text from any buffered reader
    pub fn from_reader<R: BufRead>(reader: &mut R) -> Result<Vec<Vertex>, AssetError> {
        Self::decode(reader).map_err(|e| AssetError::LoadFailed(e.to_string()))
    }

    fn decode<R: BufRead>(reader: &mut R) -> Result<Vec<Vertex>, tobj::LoadError> {
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        // Materials are ignored; the texture comes from configuration
        let (models, _) = tobj::load_obj_buf(reader, &options, |_| Ok(Default::default()))?;

        let mut corners = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            for &index in &mesh.indices {
                let i = index as usize;

                let position = [
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ];
                let color = if mesh.vertex_color.len() >= 3 * (i + 1) {
                    [
                        mesh.vertex_color[3 * i],
                        mesh.vertex_color[3 * i + 1],
                        mesh.vertex_color[3 * i + 2],
                    ]
                } else {
                    [1.0, 1.0, 1.0]
                };
                // OBJ puts V=0 at the bottom of the image
                let tex_coord = if mesh.texcoords.len() >= 2 * (i + 1) {
                    [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
                } else {
                    [0.0, 0.0]
                };

                corners.push(Vertex::new(position, color, tex_coord));
            }
        }
        Ok(corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::primitives::MeshData;
    use std::io::Cursor;

    const QUAD_OBJ: &str = "\
v -0.5 -0.5 0.0
v 0.5 -0.5 0.0
v 0.5 0.5 0.0
v -0.5 0.5 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn test_quad_is_triangulated_into_corners() {
        let corners = ObjDecoder::from_reader(&mut Cursor::new(QUAD_OBJ)).expect("decode");
        assert_eq!(corners.len(), 6);
        assert!(corners.iter().all(|v| v.color == [1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_v_coordinate_is_flipped() {
        let corners = ObjDecoder::from_reader(&mut Cursor::new(QUAD_OBJ)).expect("decode");
        let first = corners
            .iter()
            .find(|v| v.position == [-0.5, -0.5, 0.0])
            .expect("corner present");
        assert_eq!(first.tex_coord, [0.0, 1.0]);
    }

    #[test]
    fn test_corners_deduplicate_to_four_vertices() {
        let corners = ObjDecoder::from_reader(&mut Cursor::new(QUAD_OBJ)).expect("decode");
        let mesh = MeshData::from_corners(&corners).expect("mesh");
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(ObjDecoder::load("no/such/model.obj"), Err(AssetError::Io(_))));
    }
}

//! Core primitive types for rendering
//!
//! Vertices, deduplicated meshes, and the camera. Nothing here touches Vulkan.

pub mod camera;
pub mod mesh;

pub use camera::Camera;
pub use mesh::{Index, MeshData, Vertex};

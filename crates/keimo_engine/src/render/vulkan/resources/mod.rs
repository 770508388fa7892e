//! GPU resources the scene draws with

pub mod model;
pub mod texture;
pub mod uniform;

pub use model::Model;
pub use texture::{MipChain, Texture};
pub use uniform::{CameraUniform, FrameUniforms, InstanceUniform, UniformBlock};

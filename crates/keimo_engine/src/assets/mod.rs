//! Asset decoding
//!
//! Narrow decoders that turn files into CPU-side data: RGBA8 pixel buffers
//! and per-corner vertex lists. GPU upload happens in the render module.

pub mod image_loader;
pub mod obj_loader;

pub use image_loader::ImageData;
pub use obj_loader::ObjDecoder;

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Decoder rejected the file
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Image decoded to zero pixels
    #[error("Image has no pixels: {path}")]
    EmptyImage {
        /// Source of the image
        path: String,
    },

    /// Mesh data that cannot be rendered
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

//! # Rendering System
//!
//! - **Renderer**: owns the Vulkan context and every GPU object, runs frames
//! - **Frame submitter**: acquire, submit, present and rebuild-on-invalidation
//! - **Primitives**: vertices, deduplicated meshes, the camera
//! - **Window**: the surface/event interface and its glfw implementation
//! - **Vulkan backend**: RAII wrappers, device selection, swapchain chain,
//!   staging transfers, pipeline and resources

pub mod frame;
pub mod primitives;
pub mod renderer;
pub mod vulkan;
pub mod window;

pub use frame::{FrameOutcome, FrameStats, FrameSubmitter, FrameTarget};
pub use primitives::{Camera, MeshData, Vertex};
pub use renderer::Renderer;
pub use vulkan::{VulkanError, VulkanResult};
pub use window::{GlfwWindow, Key, WindowError, WindowEvent, WindowSurface};

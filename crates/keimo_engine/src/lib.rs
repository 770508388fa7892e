//! # Keimo Engine
//!
//! A minimal real-time 3D renderer built directly on Vulkan.
//!
//! ## Features
//!
//! - **Device selection**: scores every GPU and picks the best suitable one
//! - **Swapchain lifecycle**: rebuilds the whole swapchain chain on resize
//!   or invalidation
//! - **Staging uploads**: device-local buffers and mipmapped textures
//! - **Frame protocol**: acquire, submit and present with explicit semaphores
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keimo_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let mut window = GlfwWindow::new(&config.window)?;
//!     let mut renderer = Renderer::new(&mut window, &config)?;
//!
//!     let clock = FrameClock::new();
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.update_uniforms(clock.elapsed_secs())?;
//!         renderer.draw_frame(window.drawable_size())?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]

pub mod assets;
pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, ImageData, ObjDecoder},
        config::Config,
        core::{AssetConfig, EngineConfig, RendererConfig, ShaderConfig, WindowConfig},
        foundation::{
            math::{Mat4, Mat4Ext, Vec3},
            time::{FpsCounter, FrameClock},
        },
        render::{
            Camera, FrameOutcome, GlfwWindow, Key, MeshData, Renderer, Vertex, VulkanError, WindowEvent,
            WindowSurface,
        },
    };
}

//! # Core Engine Module
//!
//! Shared configuration types used by the renderer and the application.

pub mod config;

pub use config::{AssetConfig, EngineConfig, RendererConfig, ShaderConfig, WindowConfig};
pub use crate::config::{Config, ConfigError, ConfigFormat};

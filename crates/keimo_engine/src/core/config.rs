//! # Engine Configuration
//!
//! All runtime settings in one serializable tree:
//!
//! - **Window**: title, size, resizability, visibility
//! - **Renderer**: Vulkan application metadata, shaders, validation, clear color
//! - **Assets**: optional model and texture paths (built-in quad and
//!   checkerboard are used when absent)
//!
//! Every struct has sensible defaults and `with_*` builders; `validate()`
//! reports values that would fail later during initialization.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigError};

/// # Shader Configuration
///
/// Paths to the compiled SPIR-V stages. Path resolution checks the usual
/// output directories so the app runs from the workspace root or its own
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: PathBuf,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: PathBuf,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<PathBuf>, fragment_path: impl Into<PathBuf>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Resolve shader file names against common output directories
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        const SHADER_DIRS: [&str; 5] = [
            "target/shaders",
            "../target/shaders",
            "shaders",
            "resources/shaders",
            ".",
        ];

        let resolve = |name: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| Path::new(dir).join(name))
                .find(|candidate| candidate.exists())
                .unwrap_or_else(|| Path::new("target/shaders").join(name))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.vertex_shader_path, &self.fragment_shader_path] {
            if !path.exists() {
                return Err(ConfigError::Invalid(format!("Shader not found: {}", path.display())));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("shader.vert.spv", "shader.frag.spv")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
    /// Hidden windows are used by tests that still need a surface
    pub visible: bool,
}

impl WindowConfig {
    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the initial size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Show or hide the window
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Engine".to_string(),
            width: 800,
            height: 600,
            resizable: true,
            visible: true,
        }
    }
}

/// # Vulkan Renderer Configuration
///
/// Application metadata passed to instance creation, shader stages, and
/// debug features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Color attachment clear value (RGBA)
    pub clear_color: [f32; 4],
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            enable_validation: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Validation setting after applying the build-type default
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }
        self.shaders.validate()
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Keimo")
    }
}

/// # Asset Configuration
///
/// Model and texture sources. `None` selects the built-in quad and
/// checkerboard texture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// OBJ model to render
    pub model_path: Option<PathBuf>,
    /// Image to sample as the model's texture
    pub texture_path: Option<PathBuf>,
}

impl AssetConfig {
    /// Set the model path
    pub fn with_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Set the texture path
    pub fn with_texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.texture_path = Some(path.into());
        self
    }

    /// Validate that configured files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in self.model_path.iter().chain(self.texture_path.iter()) {
            if !path.exists() {
                return Err(ConfigError::Invalid(format!("Asset not found: {}", path.display())));
            }
        }
        Ok(())
    }
}

/// # Engine Configuration
///
/// Top-level configuration loaded by the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter used when `RUST_LOG` is not set
    pub log_level: String,
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Asset sources
    pub assets: AssetConfig,
}

impl EngineConfig {
    /// Set the default log filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Replace the window settings
    pub fn with_window(mut self, window: WindowConfig) -> Self {
        self.window = window;
        self
    }

    /// Replace the renderer settings
    pub fn with_renderer(mut self, renderer: RendererConfig) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the asset settings
    pub fn with_assets(mut self, assets: AssetConfig) -> Self {
        self.assets = assets;
        self
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.renderer.validate()?;
        self.assets.validate()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
            assets: AssetConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Vulkan Engine");
        assert_eq!(config.renderer.application_name, "Keimo");
        assert!(config.assets.model_path.is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default()
            .with_log_level("debug")
            .with_window(WindowConfig::default().with_size(1024, 768).with_title("Demo"));
        let text = config.to_string_with_format(ConfigFormat::Toml).expect("serialize");
        let parsed = EngineConfig::from_str_with_format(&text, ConfigFormat::Toml).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = EngineConfig::default()
            .with_renderer(RendererConfig::new("Test").with_validation(false).with_clear_color([0.1, 0.2, 0.3, 1.0]));
        let text = config.to_string_with_format(ConfigFormat::Ron).expect("serialize");
        let parsed = EngineConfig::from_str_with_format(&text, ConfigFormat::Ron).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = EngineConfig::from_str_with_format("log_level = \"warn\"\n[window]\nwidth = 320\n", ConfigFormat::Toml)
            .expect("parse");
        assert_eq!(parsed.log_level, "warn");
        assert_eq!(parsed.window.width, 320);
        assert_eq!(parsed.window.height, 600);
    }

    #[test]
    fn test_window_validation() {
        assert!(WindowConfig::default().validate().is_ok());
        assert!(WindowConfig::default().with_size(0, 600).validate().is_err());
    }

    #[test]
    fn test_missing_assets_are_rejected() {
        let assets = AssetConfig::default().with_model("does/not/exist.obj");
        assert!(matches!(assets.validate(), Err(ConfigError::Invalid(_))));
        assert!(AssetConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_follows_build_type() {
        assert_eq!(RendererConfig::default().validation_enabled(), cfg!(debug_assertions));
        assert!(!RendererConfig::default().with_validation(false).validation_enabled());
    }
}

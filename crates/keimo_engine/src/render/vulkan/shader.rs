//! SPIR-V shader modules
//!
//! Only compiled SPIR-V is accepted. GLSL sources are compiled by the build
//! script; handing one to `ShaderModule::from_file` is an error.

use std::io::Cursor;
use std::path::Path;

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};
use super::tracker::{ResourceKind, ResourceTracker, TrackedResource};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Programmable pipeline stages the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
    /// Geometry shader
    Geometry,
}

impl ShaderStage {
    /// Vulkan stage flag
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Geometry => vk::ShaderStageFlags::GEOMETRY,
        }
    }

    /// Stage named by a `name.<stage>.spv` file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = Path::new(path.file_stem()?);
        match stem.extension()?.to_str()? {
            "vert" => Some(Self::Vertex),
            "frag" => Some(Self::Fragment),
            "geom" => Some(Self::Geometry),
            _ => None,
        }
    }
}

/// Decode SPIR-V bytecode into words, rejecting empty, truncated or
/// non-SPIR-V input
pub fn parse_spirv(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(VulkanError::Shader("empty SPIR-V bytecode".to_string()));
    }
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| VulkanError::Shader(format!("invalid SPIR-V bytecode: {}", e)))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => Err(VulkanError::Shader("missing SPIR-V magic number".to_string())),
    }
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
    stage: ShaderStage,
    _tracked: TrackedResource,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8], stage: ShaderStage, tracker: &ResourceTracker) -> VulkanResult<Self> {
        let words = parse_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe { device.create_shader_module(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self {
            device,
            module,
            stage,
            _tracked: tracker.track(ResourceKind::ShaderModule),
        })
    }

    /// Load shader from a `.spv` file
    pub fn from_file<P: AsRef<Path>>(
        device: Device,
        path: P,
        stage: ShaderStage,
        tracker: &ResourceTracker,
    ) -> VulkanResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("spv") => {}
            Some(ext @ ("vert" | "frag" | "geom" | "glsl")) => {
                return Err(VulkanError::Shader(format!(
                    "{}: GLSL source (.{}) must be compiled to SPIR-V first",
                    path.display(),
                    ext
                )));
            }
            _ => {
                return Err(VulkanError::Shader(format!("{}: unknown shader language", path.display())));
            }
        }

        let bytes = std::fs::read(path)
            .map_err(|e| VulkanError::Shader(format!("Failed to read shader file {}: {}", path.display(), e)))?;
        log::debug!("Loaded {:?} shader from {:?} ({} bytes)", stage, path, bytes.len());

        Self::from_bytes(device, &bytes, stage, tracker)
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage this module was loaded for
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(magic: u32) -> Vec<u8> {
        [magic, 0x0001_0000, 0, 8, 0].iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_valid_header_parses() {
        let words = parse_spirv(&header(SPIRV_MAGIC)).expect("valid header");
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_rejects_empty_and_truncated() {
        assert!(matches!(parse_spirv(&[]), Err(VulkanError::Shader(_))));
        let mut bytes = header(SPIRV_MAGIC);
        bytes.pop();
        assert!(matches!(parse_spirv(&bytes), Err(VulkanError::Shader(_))));
    }

    #[test]
    fn test_rejects_wrong_magic() {
        assert!(matches!(parse_spirv(&header(0xDEAD_BEEF)), Err(VulkanError::Shader(_))));
    }

    #[test]
    fn test_stage_from_path() {
        assert_eq!(ShaderStage::from_path(Path::new("shaders/shader.vert.spv")), Some(ShaderStage::Vertex));
        assert_eq!(ShaderStage::from_path(Path::new("shader.frag.spv")), Some(ShaderStage::Fragment));
        assert_eq!(ShaderStage::from_path(Path::new("shader.spv")), None);
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Geometry.flags(), vk::ShaderStageFlags::GEOMETRY);
    }
}

//! Vulkan rendering backend
//!
//! RAII wrappers over every handle the engine creates. Each wrapper keeps a
//! clone of the `ash::Device` and destroys its handle on drop; owners order
//! their fields so dependents drop first.

pub mod buffer;
pub mod chain;
pub mod commands;
pub mod context;
pub mod descriptor_set;
pub mod device_selector;
pub mod framebuffer;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod resources;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod tracker;
pub mod transfer;
pub mod vertex_layout;

pub use buffer::Buffer;
pub use chain::{ChainInputs, SwapchainChain};
pub use commands::{CommandBuffers, CommandPool, CommandRecorder};
pub use context::{LogicalDevice, VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter};
pub use device_selector::{DeviceCandidate, PhysicalDeviceInfo, QueueFamilyIndices};
pub use framebuffer::{DepthBuffer, Framebuffer};
pub use image::{Image, ImageDesc, ImageView};
pub use pipeline::{GraphicsPipeline, PipelineBuilder};
pub use render_pass::RenderPass;
pub use resources::{FrameUniforms, MipChain, Model, Texture, UniformBlock};
pub use shader::{ShaderModule, ShaderStage};
pub use swapchain::Swapchain;
pub use sync::{FrameSync, Semaphore};
pub use tracker::{ResourceKind, ResourceTracker, TeardownReport, TrackedResource};
pub use transfer::{LayoutTransition, TransferContext};
pub use vertex_layout::{VertexAttribute, VertexLayout};

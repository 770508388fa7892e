//! Everything whose lifetime is bounded by the swapchain
//!
//! Render pass, pipeline, framebuffers and the pre-recorded command buffers
//! are built against one swapchain's format and extent. They are torn down
//! and rebuilt together whenever the surface invalidates the swapchain.

use ash::vk;

use super::commands::{CommandBuffers, CommandPool};
use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::descriptor_set::DescriptorSetLayout;
use super::framebuffer::{DepthBuffer, Framebuffer};
use super::pipeline::{GraphicsPipeline, PipelineBuilder};
use super::render_pass::RenderPass;
use super::resources::Model;
use super::shader::{ShaderModule, ShaderStage};
use super::swapchain::Swapchain;
use super::transfer::TransferContext;
use crate::render::primitives::Vertex;

/// Long-lived objects the chain is built from
pub struct ChainInputs<'a> {
    /// Device, surface and queues
    pub context: &'a VulkanContext,
    /// Upload helper, also the source of the resource tracker
    pub transfer: &'a TransferContext,
    /// Pool the per-image command buffers come from
    pub command_pool: &'a CommandPool,
    /// Vertex stage
    pub vertex_shader: &'a ShaderModule,
    /// Fragment stage
    pub fragment_shader: &'a ShaderModule,
    /// Layout of set 0
    pub descriptor_set_layout: &'a DescriptorSetLayout,
    /// Set 0, already written
    pub descriptor_set: vk::DescriptorSet,
    /// Geometry drawn every frame
    pub model: &'a Model,
    /// Color the frame is cleared to
    pub clear_color: [f32; 4],
}

// Field order is drop order
struct Dependents {
    framebuffers: Vec<Framebuffer>,
    command_buffers: CommandBuffers,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
}

/// Swapchain plus every object that depends on it
pub struct SwapchainChain {
    dependents: Option<Dependents>,
    swapchain: Swapchain,
    depth: Option<DepthBuffer>,
}

impl SwapchainChain {
    /// Build the swapchain and its dependents, then record one command
    /// buffer per image
    pub fn new(inputs: &ChainInputs<'_>, window_size: (u32, u32)) -> VulkanResult<Self> {
        let swapchain = Swapchain::new(inputs.context, window_size, None, inputs.transfer.tracker())?;
        let mut chain = Self {
            dependents: None,
            swapchain,
            depth: None,
        };
        chain.build_dependents(inputs)?;
        Ok(chain)
    }

    /// Wait for the device, tear everything down and build it again against
    /// a new swapchain that retires the current one
    pub fn rebuild(&mut self, inputs: &ChainInputs<'_>, window_size: (u32, u32)) -> VulkanResult<()> {
        inputs.context.wait_idle()?;

        self.dependents = None;
        retire_and_replace(&mut self.swapchain, &mut self.depth, |previous| {
            Swapchain::new(inputs.context, window_size, Some(previous), inputs.transfer.tracker())
        })?;

        self.build_dependents(inputs)?;
        log::info!(
            "Swapchain chain rebuilt at {}x{}",
            self.extent().width,
            self.extent().height
        );
        Ok(())
    }

    fn build_dependents(&mut self, inputs: &ChainInputs<'_>) -> VulkanResult<()> {
        let device = inputs.context.raw_device();
        let tracker = inputs.transfer.tracker();
        let extent = self.swapchain.extent();

        let depth = DepthBuffer::new(inputs.transfer, extent)?;
        let render_pass = RenderPass::new_forward_pass(device.clone(), self.swapchain.format().format, tracker)?;

        let pipeline = PipelineBuilder::new(render_pass.handle(), extent)
            .shader(ShaderStage::Vertex, inputs.vertex_shader)
            .shader(ShaderStage::Fragment, inputs.fragment_shader)
            .vertex_layout::<Vertex>()
            .descriptor_set_layout(inputs.descriptor_set_layout.handle())
            .build(&device, tracker)?;

        let framebuffers = self
            .swapchain
            .image_views()
            .map(|view| Framebuffer::new(device.clone(), render_pass.handle(), &[view, depth.view()], extent, tracker))
            .collect::<VulkanResult<Vec<_>>>()?;

        let command_buffers = inputs
            .command_pool
            .allocate(self.swapchain.image_count() as u32, tracker)?;

        let dependents = Dependents {
            framebuffers,
            command_buffers,
            pipeline,
            render_pass,
        };
        record_draws(&dependents, extent, inputs)?;

        self.depth = Some(depth);
        self.dependents = Some(dependents);
        Ok(())
    }

    /// Pre-recorded command buffer for swapchain image `image_index`
    pub fn command_buffer(&self, image_index: u32) -> VulkanResult<vk::CommandBuffer> {
        self.dependents
            .as_ref()
            .and_then(|d| d.command_buffers.get(image_index as usize))
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no command buffer for swapchain image {}", image_index),
            })
    }

    /// Current swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Current extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }
}

/// Replace `swapchain` with the one `create` builds from it. The retired
/// swapchain and its views are destroyed before the retired depth buffer,
/// the same order the chain's fields drop in.
fn retire_and_replace<S, D>(
    swapchain: &mut S,
    depth: &mut Option<D>,
    create: impl FnOnce(&S) -> VulkanResult<S>,
) -> VulkanResult<()> {
    let retired_depth = depth.take();
    let replacement = create(swapchain)?;
    *swapchain = replacement;
    drop(retired_depth);
    Ok(())
}

fn record_draws(dependents: &Dependents, extent: vk::Extent2D, inputs: &ChainInputs<'_>) -> VulkanResult<()> {
    let clear_values = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: inputs.clear_color,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ];
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };

    for (index, framebuffer) in dependents.framebuffers.iter().enumerate() {
        let mut recorder = dependents.command_buffers.recorder(index)?;
        recorder.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
        {
            let mut pass = recorder.begin_render_pass(
                dependents.render_pass.handle(),
                framebuffer.handle(),
                render_area,
                &clear_values,
            )?;
            pass.bind_pipeline(dependents.pipeline.handle());
            pass.bind_vertex_buffer(inputs.model.vertex_buffer().handle());
            pass.bind_index_buffer(inputs.model.index_buffer().handle());
            pass.bind_descriptor_sets(dependents.pipeline.layout(), &[inputs.descriptor_set]);
            pass.draw_indexed(inputs.model.index_count());
        }
        recorder.end()?;
    }

    log::debug!("Recorded {} draw command buffers", dependents.framebuffers.len());
    Ok(())
}

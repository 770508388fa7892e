//! Top-level renderer
//!
//! Creates everything in dependency order, owns it for the renderer's
//! lifetime, and runs frames through the `FrameSubmitter`. Fields of
//! `RendererCore` are declared in reverse creation order so that dropping the
//! renderer destroys dependents first and the Vulkan context last.

use std::time::Instant;

use ash::vk;

use super::frame::{AcquireOutcome, FrameOutcome, FrameStats, FrameSubmitter, FrameTarget, PresentOutcome};
use super::primitives::{Camera, MeshData};
use super::vulkan::descriptor_set::{self, DescriptorPool, DescriptorSetLayout, DescriptorSetWriter};
use super::vulkan::resources::{CameraUniform, FrameUniforms, InstanceUniform, Model, Texture, UniformBlock};
use super::vulkan::{
    ChainInputs, CommandPool, FrameSync, ResourceTracker, ShaderModule, ShaderStage, SwapchainChain, TeardownReport,
    TransferContext, VulkanContext, VulkanError, VulkanResult,
};
use super::window::WindowSurface;
use crate::assets::ImageData;
use crate::core::EngineConfig;

const DEFAULT_TEXTURE_SIZE: u32 = 256;
const DEFAULT_TEXTURE_CELL: u32 = 32;

/// Owner of every GPU object; dropped in field order
struct RendererCore {
    sync: FrameSync,
    chain: SwapchainChain,
    _descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    descriptor_set_layout: DescriptorSetLayout,
    camera_block: UniformBlock<CameraUniform>,
    instance_block: UniformBlock<InstanceUniform>,
    texture: Texture,
    model: Model,
    vertex_shader: ShaderModule,
    fragment_shader: ShaderModule,
    command_pool: CommandPool,
    transfer: TransferContext,
    camera: Camera,
    clear_color: [f32; 4],
    window_size: (u32, u32),
    _report: TeardownReport,
    tracker: ResourceTracker,
    context: VulkanContext,
}

impl FrameTarget for RendererCore {
    fn acquire(&mut self) -> VulkanResult<AcquireOutcome> {
        let swapchain = self.chain.swapchain();
        let acquired = unsafe {
            swapchain.loader().acquire_next_image(
                swapchain.handle(),
                u64::MAX,
                self.sync.image_available.handle(),
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
            // A suboptimal image is never presented; it stays acquired until
            // the rebuild passes this swapchain as old_swapchain and retires it
            Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::NeedsRebuild),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn submit(&mut self, image_index: u32) -> VulkanResult<()> {
        let wait_semaphores = [self.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.chain.command_buffer(image_index)?];
        let signal_semaphores = [self.sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.context
                .device
                .device
                .queue_submit(self.context.device.graphics_queue, &[submit_info], vk::Fence::null())
                .map_err(VulkanError::Api)
        }
    }

    fn present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [self.sync.render_finished.handle()];
        let swapchains = [self.chain.swapchain().handle()];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_queue = self.context.device.present_queue;
        let presented = unsafe {
            self.chain
                .swapchain()
                .loader()
                .queue_present(present_queue, &present_info)
        };
        let outcome = match presented {
            Ok(false) => PresentOutcome::Presented,
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentOutcome::NeedsRebuild,
            Err(e) => return Err(VulkanError::Api(e)),
        };

        unsafe {
            self.context
                .device
                .device
                .queue_wait_idle(present_queue)
                .map_err(VulkanError::Api)?;
        }
        Ok(outcome)
    }

    fn rebuild(&mut self) -> VulkanResult<()> {
        let inputs = ChainInputs {
            context: &self.context,
            transfer: &self.transfer,
            command_pool: &self.command_pool,
            vertex_shader: &self.vertex_shader,
            fragment_shader: &self.fragment_shader,
            descriptor_set_layout: &self.descriptor_set_layout,
            descriptor_set: self.descriptor_set,
            model: &self.model,
            clear_color: self.clear_color,
        };
        self.chain.rebuild(&inputs, self.window_size)?;

        // A suboptimal acquire leaves image_available signaled with no
        // waiter. The device is idle and the swapchain that owned the image is
        // retired, so the pair is replaced rather than reused.
        self.sync = FrameSync::new(self.context.raw_device(), &self.tracker)?;

        let extent = self.chain.extent();
        if extent.height > 0 {
            self.camera
                .set_aspect_ratio(extent.width as f32 / extent.height as f32);
        }
        Ok(())
    }
}

/// The engine's renderer: one model, one texture, one pipeline
pub struct Renderer {
    submitter: FrameSubmitter,
    core: RendererCore,
}

impl Renderer {
    /// Initialize Vulkan against `window` and upload the configured scene
    pub fn new(window: &mut dyn WindowSurface, config: &EngineConfig) -> VulkanResult<Self> {
        let started = Instant::now();
        let tracker = ResourceTracker::new();
        let window_size = window.drawable_size();

        let context = VulkanContext::new(window, &config.renderer)?;
        let device = context.raw_device();
        let transfer = TransferContext::new(&context, &tracker)?;
        let command_pool = CommandPool::new(device.clone(), context.physical.graphics_family, &tracker)?;

        let shaders = &config.renderer.shaders;
        let vertex_shader =
            ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path, ShaderStage::Vertex, &tracker)?;
        let fragment_shader =
            ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path, ShaderStage::Fragment, &tracker)?;

        let model = match &config.assets.model_path {
            Some(path) => Model::load(&transfer, path)?,
            None => Model::from_mesh(&transfer, &MeshData::quad())?,
        };

        let image = match &config.assets.texture_path {
            Some(path) => ImageData::from_file(path)?,
            None => ImageData::checkerboard(
                DEFAULT_TEXTURE_SIZE,
                DEFAULT_TEXTURE_CELL,
                [255, 255, 255, 255],
                [64, 64, 64, 255],
            )?,
        };
        let texture = Texture::from_image_data(&transfer, &image)?;

        let mut camera = Camera::default();
        if window_size.1 > 0 {
            camera.set_aspect_ratio(window_size.0 as f32 / window_size.1 as f32);
        }
        let uniforms = FrameUniforms::compute(&camera, 0.0);
        let camera_block = UniformBlock::new(&transfer, &uniforms.camera)?;
        let instance_block = UniformBlock::new(&transfer, &uniforms.instance)?;

        let descriptor_set_layout = descriptor_set::scene_layout().build(&device, &tracker)?;
        let descriptor_pool = DescriptorPool::new(device.clone(), &descriptor_set_layout, 1, &tracker)?;
        let descriptor_set = descriptor_pool.allocate(&descriptor_set_layout)?;

        DescriptorSetWriter::new(descriptor_set)
            .uniform_buffer(descriptor_set::CAMERA_BINDING, camera_block.handle(), camera_block.range())
            .uniform_buffer(descriptor_set::INSTANCE_BINDING, instance_block.handle(), instance_block.range())
            .combined_image_sampler(descriptor_set::TEXTURE_BINDING, texture.view(), texture.sampler())
            .update(&device);

        let inputs = ChainInputs {
            context: &context,
            transfer: &transfer,
            command_pool: &command_pool,
            vertex_shader: &vertex_shader,
            fragment_shader: &fragment_shader,
            descriptor_set_layout: &descriptor_set_layout,
            descriptor_set,
            model: &model,
            clear_color: config.renderer.clear_color,
        };
        let chain = SwapchainChain::new(&inputs, window_size)?;
        let sync = FrameSync::new(device, &tracker)?;

        log::info!(
            "Renderer initialized in {:.1} ms on {}",
            started.elapsed().as_secs_f64() * 1000.0,
            context.physical.name
        );

        Ok(Self {
            submitter: FrameSubmitter::new(),
            core: RendererCore {
                sync,
                chain,
                _descriptor_pool: descriptor_pool,
                descriptor_set,
                descriptor_set_layout,
                camera_block,
                instance_block,
                texture,
                model,
                vertex_shader,
                fragment_shader,
                command_pool,
                transfer,
                camera,
                clear_color: config.renderer.clear_color,
                window_size,
                _report: TeardownReport::new(&tracker),
                tracker,
                context,
            },
        })
    }

    /// Write the camera and model blocks for `time` seconds since start
    pub fn update_uniforms(&mut self, time: f32) -> VulkanResult<()> {
        let uniforms = FrameUniforms::compute(&self.core.camera, time);
        self.core.camera_block.update(&uniforms.camera)?;
        self.core.instance_block.update(&uniforms.instance)
    }

    /// Draw one frame; `window_size` is used if the chain must be rebuilt
    pub fn draw_frame(&mut self, window_size: (u32, u32)) -> VulkanResult<FrameOutcome> {
        self.core.window_size = window_size;
        self.submitter.draw_frame(&mut self.core)
    }

    /// Rebuild the swapchain chain without waiting for the surface to ask
    pub fn force_rebuild(&mut self, window_size: (u32, u32)) -> VulkanResult<()> {
        self.core.window_size = window_size;
        self.core.rebuild()
    }

    /// Tracker every GPU object is registered with
    pub fn tracker(&self) -> &ResourceTracker {
        &self.core.tracker
    }

    /// Upload helper, for callers that create extra resources
    pub fn transfer(&self) -> &TransferContext {
        &self.core.transfer
    }

    /// Sampled texture
    pub fn texture(&self) -> &Texture {
        &self.core.texture
    }

    /// Frame counters
    pub fn stats(&self) -> FrameStats {
        self.submitter.stats()
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.core.chain.extent()
    }

    /// Scene camera
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.core.camera
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.core.context.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {}", e);
        }
    }
}

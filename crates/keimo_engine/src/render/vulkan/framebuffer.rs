//! Framebuffers and the depth attachment
//!
//! Both are rebuilt with the swapchain: one framebuffer per swapchain image,
//! one depth buffer sized to the swapchain extent.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};
use super::image::{Image, ImageDesc, ImageView};
use super::render_pass::DEPTH_FORMAT;
use super::tracker::{ResourceKind, ResourceTracker, TrackedResource};
use super::transfer::{LayoutTransition, TransferContext};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
    _tracked: TrackedResource,
}

impl Framebuffer {
    /// Create a framebuffer over `attachments` (color view, then depth view)
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        tracker: &ResourceTracker,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
            _tracked: tracker.track(ResourceKind::Framebuffer),
        })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Depth image and view
pub struct DepthBuffer {
    view: ImageView,
    image: Image,
}

impl DepthBuffer {
    /// Create a `D32_SFLOAT` depth buffer and move it to
    /// `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`
    pub fn new(transfer: &TransferContext, extent: vk::Extent2D) -> VulkanResult<Self> {
        let image = Image::new(
            transfer.device().clone(),
            transfer.memory_properties(),
            ImageDesc {
                extent,
                format: DEPTH_FORMAT,
                mip_levels: 1,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            },
            transfer.tracker(),
        )?;

        let view = ImageView::new(
            transfer.device().clone(),
            image.handle(),
            DEPTH_FORMAT,
            vk::ImageAspectFlags::DEPTH,
            1,
            transfer.tracker(),
        )?;

        transfer.transition(
            &image,
            LayoutTransition::new(vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)?,
        )?;
        log::debug!("Depth buffer created: {}x{}", extent.width, extent.height);

        Ok(Self { view, image })
    }

    /// Depth view for framebuffers
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    /// Depth image handle
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }
}

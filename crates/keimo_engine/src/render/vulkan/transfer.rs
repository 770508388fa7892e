//! Staging uploads, readback, and image layout transitions
//!
//! Every device-local resource is filled through `TransferContext`: data is
//! copied into a host-visible staging buffer, a one-shot command buffer copies
//! it into the destination, and the call blocks until the queue is idle. The
//! staging buffer is dropped before the call returns.
//!
//! Buffer copies run on the transfer family. Image uploads run on the graphics
//! family because mip generation blits on the same image afterwards.

use ash::{vk, Device, Instance};

use super::buffer::{Buffer, HOST_VISIBLE_COHERENT};
use super::commands::CommandPool;
use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::image::{Image, ImageDesc};
use super::tracker::ResourceTracker;

/// One legal image layout edge with its synchronization scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Layout the image is in
    pub old_layout: vk::ImageLayout,
    /// Layout the image moves to
    pub new_layout: vk::ImageLayout,
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing `src_access`
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming `dst_access`
    pub dst_stage: vk::PipelineStageFlags,
    /// Image aspect the barrier covers
    pub aspect: vk::ImageAspectFlags,
}

impl LayoutTransition {
    /// Look up the edge `old -> new`.
    ///
    /// Only three edges exist: `UNDEFINED -> TRANSFER_DST_OPTIMAL`,
    /// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL` and
    /// `UNDEFINED -> DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
    pub fn new(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> VulkanResult<Self> {
        let (src_access, dst_access, src_stage, dst_stage, aspect) = match (old_layout, new_layout) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::ImageAspectFlags::COLOR,
            ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::ImageAspectFlags::COLOR,
            ),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::ImageAspectFlags::DEPTH,
            ),
            (from, to) => return Err(VulkanError::UnsupportedLayoutTransition { from, to }),
        };

        Ok(Self {
            old_layout,
            new_layout,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
            aspect,
        })
    }

    /// Barrier covering `level_count` mip levels of `image`
    pub fn barrier(&self, image: vk::Image, level_count: u32) -> vk::ImageMemoryBarrier {
        vk::ImageMemoryBarrier::builder()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .build()
    }

    /// Record the barrier into `command_buffer`
    pub fn record(&self, device: &Device, command_buffer: vk::CommandBuffer, image: vk::Image, level_count: u32) {
        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                self.src_stage,
                self.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[self.barrier(image, level_count)],
            );
        }
    }
}

/// Upload and readback helper owning the transfer and graphics command pools
pub struct TransferContext {
    transfer_pool: CommandPool,
    graphics_pool: CommandPool,
    device: Device,
    instance: Instance,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    max_sampler_anisotropy: Option<f32>,
    transfer_queue: vk::Queue,
    graphics_queue: vk::Queue,
    transfer_family: u32,
    graphics_family: u32,
    tracker: ResourceTracker,
}

impl TransferContext {
    /// Create pools on the context's transfer and graphics families
    pub fn new(context: &VulkanContext, tracker: &ResourceTracker) -> VulkanResult<Self> {
        let device = context.raw_device();
        let physical = &context.physical;
        let max_sampler_anisotropy = (physical.features.sampler_anisotropy == vk::TRUE)
            .then(|| physical.max_sampler_anisotropy());

        if physical.has_dedicated_transfer() {
            log::info!("Buffer uploads use dedicated transfer family {}", physical.transfer_family);
        } else {
            log::info!("Buffer uploads share graphics family {}", physical.graphics_family);
        }

        Ok(Self {
            transfer_pool: CommandPool::new(device.clone(), physical.transfer_family, tracker)?,
            graphics_pool: CommandPool::new(device.clone(), physical.graphics_family, tracker)?,
            device,
            instance: context.instance().clone(),
            physical_device: physical.device,
            memory_properties: physical.memory_properties,
            max_sampler_anisotropy,
            transfer_queue: context.device.transfer_queue,
            graphics_queue: context.device.graphics_queue,
            transfer_family: physical.transfer_family,
            graphics_family: physical.graphics_family,
            tracker: tracker.clone(),
        })
    }

    /// Families a device-local buffer must be shared across
    pub fn sharing_families(&self) -> Vec<u32> {
        if self.transfer_family == self.graphics_family {
            vec![self.graphics_family]
        } else {
            vec![self.transfer_family, self.graphics_family]
        }
    }

    fn staging(&self, bytes: &[u8]) -> VulkanResult<Buffer> {
        let staging = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            HOST_VISIBLE_COHERENT,
            &[],
            &self.tracker,
        )?;
        staging.write_bytes(bytes)?;
        Ok(staging)
    }

    /// Copy `bytes` into a new device-local buffer with `usage | TRANSFER_DST`
    pub fn upload(&self, bytes: &[u8], usage: vk::BufferUsageFlags) -> VulkanResult<Buffer> {
        let staging = self.staging(bytes)?;

        let destination = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            staging.size(),
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            &self.sharing_families(),
            &self.tracker,
        )?;

        self.copy_buffer(&staging, &destination, staging.size())?;
        log::debug!("Uploaded {} bytes ({:?})", bytes.len(), usage);
        Ok(destination)
    }

    /// Copy the first `size` bytes of a `TRANSFER_SRC` buffer back to the host
    pub fn read_back(&self, source: &Buffer, size: vk::DeviceSize) -> VulkanResult<Vec<u8>> {
        let readback = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            HOST_VISIBLE_COHERENT,
            &[],
            &self.tracker,
        )?;

        self.copy_buffer(source, &readback, size)?;
        readback.read_bytes(size as usize)
    }

    fn copy_buffer(&self, source: &Buffer, destination: &Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
        if size > source.size() || size > destination.size() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "copy of {} bytes from {}-byte buffer into {}-byte buffer",
                    size,
                    source.size(),
                    destination.size()
                ),
            });
        }

        self.transfer_pool.submit_one_shot(self.transfer_queue, |device, command_buffer| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe {
                device.cmd_copy_buffer(command_buffer, source.handle(), destination.handle(), &[region]);
            }
            Ok(())
        })
    }

    /// Move every level of `image` to `TRANSFER_DST_OPTIMAL` and copy `bytes`
    /// into level 0
    pub fn upload_to_image(&self, bytes: &[u8], image: &Image) -> VulkanResult<()> {
        let desc = *image.desc();
        check_level0_size(&desc, bytes.len())?;
        let staging = self.staging(bytes)?;
        let to_transfer_dst = LayoutTransition::new(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

        self.submit_graphics(|device, command_buffer| {
            to_transfer_dst.record(device, command_buffer, image.handle(), desc.mip_levels);

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width: desc.extent.width,
                    height: desc.extent.height,
                    depth: 1,
                })
                .build();

            unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle(),
                    image.handle(),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            Ok(())
        })?;

        log::debug!(
            "Uploaded {} bytes into {}x{} image",
            bytes.len(),
            desc.extent.width,
            desc.extent.height
        );
        Ok(())
    }

    /// Apply a layout transition to every level of `image`
    pub fn transition(&self, image: &Image, transition: LayoutTransition) -> VulkanResult<()> {
        let levels = image.desc().mip_levels;
        self.submit_graphics(|device, command_buffer| {
            transition.record(device, command_buffer, image.handle(), levels);
            Ok(())
        })
    }

    /// Record and run a one-shot command buffer on the graphics queue
    pub fn submit_graphics<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer) -> VulkanResult<()>,
    {
        self.graphics_pool.submit_one_shot(self.graphics_queue, record)
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Memory heaps and types of the selected GPU
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Whether optimal-tiling images of `format` can be blitted with linear filtering
    pub fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let properties = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    /// Anisotropy limit, or `None` when the device lacks the feature
    pub fn max_sampler_anisotropy(&self) -> Option<f32> {
        self.max_sampler_anisotropy
    }

    /// Tracker new resources are registered with
    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }
}

/// Bytes per texel of the color formats images are uploaded in
fn texel_size(format: vk::Format) -> Option<usize> {
    match format {
        vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM => Some(4),
        _ => None,
    }
}

/// The copy reads exactly one tightly packed level 0 out of the staging buffer
fn check_level0_size(desc: &ImageDesc, len: usize) -> VulkanResult<()> {
    let texel = texel_size(desc.format).ok_or_else(|| VulkanError::InvalidOperation {
        reason: format!("no staging upload path for {:?}", desc.format),
    })?;
    let expected = desc.extent.width as usize * desc.extent.height as usize * texel;
    if expected == 0 || len != expected {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "{}x{} {:?} upload needs {} bytes, got {}",
                desc.extent.width, desc.extent.height, desc.format, expected, len
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_edges() {
        let upload = LayoutTransition::new(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .expect("legal edge");
        assert_eq!(upload.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(upload.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let sample = LayoutTransition::new(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .expect("legal edge");
        assert_eq!(sample.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(sample.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let depth = LayoutTransition::new(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .expect("legal edge");
        assert_eq!(depth.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(depth.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn test_other_edges_are_rejected() {
        let illegal = [
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::UNDEFINED),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::UNDEFINED),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR),
        ];
        for (from, to) in illegal {
            match LayoutTransition::new(from, to) {
                Err(VulkanError::UnsupportedLayoutTransition { from: f, to: t }) => {
                    assert_eq!((f, t), (from, to));
                }
                other => panic!("{:?} -> {:?} accepted: {:?}", from, to, other.map(|t| t.new_layout)),
            }
        }
    }

    fn rgba_desc(width: u32, height: u32) -> ImageDesc {
        ImageDesc {
            extent: vk::Extent2D { width, height },
            format: vk::Format::R8G8B8A8_SRGB,
            mip_levels: 1,
            usage: vk::ImageUsageFlags::TRANSFER_DST,
        }
    }

    #[test]
    fn test_level0_upload_size_must_match() {
        assert!(check_level0_size(&rgba_desc(2, 2), 16).is_ok());
        assert!(matches!(
            check_level0_size(&rgba_desc(2, 2), 12),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(check_level0_size(&rgba_desc(2, 2), 20).is_err());
        assert!(check_level0_size(&rgba_desc(0, 0), 0).is_err());

        let mut depth = rgba_desc(2, 2);
        depth.format = vk::Format::D32_SFLOAT;
        assert!(check_level0_size(&depth, 16).is_err());
    }

    #[test]
    fn test_barrier_covers_requested_levels() {
        let transition = LayoutTransition::new(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .expect("legal edge");
        let barrier = transition.barrier(vk::Image::null(), 7);
        assert_eq!(barrier.subresource_range.level_count, 7);
        assert_eq!(barrier.subresource_range.base_mip_level, 0);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    }
}

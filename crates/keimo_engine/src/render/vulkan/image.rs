//! Device images and views
//!
//! `Image` owns a 2D optimal-tiling image with dedicated device-local memory.
//! `ImageView` owns a view; the swapchain's images are not owned but their
//! views are.

use ash::{vk, Device};

use super::buffer;
use super::context::{VulkanError, VulkanResult};
use super::tracker::{ResourceKind, ResourceTracker, TrackedResource};

/// Parameters of a 2D image
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Size of level 0
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Number of mip levels
    pub mip_levels: u32,
    /// How the image will be used
    pub usage: vk::ImageUsageFlags,
}

/// 2D image with bound device-local memory
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    desc: ImageDesc,
    _tracked: TrackedResource,
}

impl Image {
    /// Create the image in `UNDEFINED` layout and bind memory
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        desc: ImageDesc,
        tracker: &ResourceTracker,
    ) -> VulkanResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 || desc.mip_levels == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "image {}x{} with {} levels",
                    desc.extent.width, desc.extent.height, desc.mip_levels
                ),
            });
        }

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { device.create_image(&image_info, None).map_err(VulkanError::Api)? };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match buffer::allocate(&device, memory_properties, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        log::trace!(
            "Image created: {}x{} {:?}, {} levels",
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.mip_levels
        );

        Ok(Self {
            device,
            image,
            memory,
            desc,
            _tracked: tracker.track(ResourceKind::Image),
        })
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Creation parameters
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Image view with RAII cleanup
pub struct ImageView {
    device: Device,
    view: vk::ImageView,
    _tracked: TrackedResource,
}

impl ImageView {
    /// 2D view over `level_count` mip levels of `image`
    pub fn new(
        device: Device,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
        level_count: u32,
        tracker: &ResourceTracker,
    ) -> VulkanResult<Self> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { device.create_image_view(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self {
            device,
            view,
            _tracked: tracker.track(ResourceKind::ImageView),
        })
    }

    /// View handle
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
    }
}

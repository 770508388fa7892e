//! Vulkan swapchain management
//!
//! Surface format, present mode, extent and image count are picked by plain
//! functions over the surface's reported capabilities. `Swapchain` owns the
//! handle and one color view per image; recreation passes the retiring
//! swapchain so the driver can hand over its resources.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;

use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::image::ImageView;
use super::tracker::{ResourceKind, ResourceTracker, TrackedResource};

/// Format used when the surface accepts anything
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the surface format.
///
/// A single `UNDEFINED` entry means the surface has no preference.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    match formats {
        [] => Err(VulkanError::NoSurfaceFormat),
        [only] if only.format == vk::Format::UNDEFINED => Ok(PREFERRED_FORMAT),
        _ => Ok(formats
            .iter()
            .find(|sf| sf.format == PREFERRED_FORMAT.format && sf.color_space == PREFERRED_FORMAT.color_space)
            .copied()
            .unwrap_or(formats[0])),
    }
}

/// `MAILBOX` when offered, otherwise `FIFO` which is always supported
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent, or the window size clamped into the
/// surface's limits when the surface leaves it to the swapchain
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: window_size
            .0
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: window_size
            .1
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means unlimited)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Swapchain with its image views
pub struct Swapchain {
    image_views: Vec<ImageView>,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    _tracked: TrackedResource,
}

impl Swapchain {
    /// Create a swapchain for the context's surface.
    ///
    /// `previous` is handed to the driver as `old_swapchain`; the caller drops
    /// it once this returns.
    pub fn new(
        context: &VulkanContext,
        window_size: (u32, u32),
        previous: Option<&Swapchain>,
        tracker: &ResourceTracker,
    ) -> VulkanResult<Self> {
        let capabilities = context.surface_capabilities()?;
        let format = choose_surface_format(&context.surface_formats()?)?;
        let present_mode = choose_present_mode(&context.present_modes()?);
        let extent = choose_extent(&capabilities, window_size);
        let image_count = choose_image_count(&capabilities);

        let physical = &context.physical;
        let families = [physical.graphics_family, physical.present_family];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(previous.map_or(vk::SwapchainKHR::null(), Swapchain::handle));
        if families[0] != families[1] {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families);
        }

        let loader = context.swapchain_loader().clone();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None).map_err(VulkanError::Api)? };
        let tracked = tracker.track(ResourceKind::Swapchain);

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let mut result = Self {
            image_views: Vec::with_capacity(images.len()),
            loader,
            swapchain,
            images,
            format,
            extent,
            _tracked: tracked,
        };

        let device = context.raw_device();
        for &image in &result.images {
            let view = ImageView::new(
                device.clone(),
                image,
                format.format,
                vk::ImageAspectFlags::COLOR,
                1,
                tracker,
            )?;
            result.image_views.push(view);
        }

        log::info!(
            "Swapchain created: {:?} {:?}, {}x{}, {} images, {:?}",
            format.format,
            format.color_space,
            extent.width,
            extent.height,
            result.images.len(),
            present_mode
        );

        Ok(result)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get image views
    pub fn image_views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        self.image_views.iter().map(ImageView::handle)
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.image_views.clear();
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        log::debug!("Swapchain destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn chosen(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::Format, vk::ColorSpaceKHR)> {
        choose_surface_format(formats).ok().map(|sf| (sf.format, sf.color_space))
    }

    const PREFERRED: (vk::Format, vk::ColorSpaceKHR) = (PREFERRED_FORMAT.format, PREFERRED_FORMAT.color_space);

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_format_list_is_an_error() {
        assert!(matches!(choose_surface_format(&[]), Err(VulkanError::NoSurfaceFormat)));
    }

    #[test]
    fn test_undefined_format_means_any() {
        let formats = [surface_format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(chosen(&formats), Some(PREFERRED));
    }

    #[test]
    fn test_preferred_format_wins() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED_FORMAT,
        ];
        assert_eq!(chosen(&formats), Some(PREFERRED));
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let first = surface_format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            first,
            surface_format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert_eq!(chosen(&formats), Some((first.format, first.color_space)));
    }

    #[test]
    fn test_present_mode_preference() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_uses_current_when_fixed() {
        let caps = capabilities((1280, 720), 2, 3);
        let extent = choose_extent(&caps, (800, 600));
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_extent_clamps_window_size() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 3);
        let extent = choose_extent(&caps, (8000, 0));
        assert_eq!((extent.width, extent.height), (4096, 1));
        let extent = choose_extent(&caps, (800, 600));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_image_count() {
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 3)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 3, 3)), 3);
        assert_eq!(choose_image_count(&capabilities((1, 1), 2, 0)), 3);
    }
}

//! Physical device selection
//!
//! Every enumerated GPU is reduced to a `DeviceCandidate` capability
//! snapshot and scored. Scoring and selection are plain functions over the
//! snapshots; only `PhysicalDeviceInfo::enumerate_and_select` talks to Vulkan.

use std::collections::BTreeSet;
use std::ffi::CStr;

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;

use super::context::{VulkanError, VulkanResult};

/// Score added for a discrete GPU
pub const DISCRETE_GPU_SCORE: i64 = 1000;
/// Score added for an integrated GPU
pub const INTEGRATED_GPU_SCORE: i64 = 500;
/// Score added for a CPU implementation
pub const CPU_SCORE: i64 = 100;
/// Penalty for each missing requirement or unknown device type
pub const DISQUALIFIED: i64 = -100_000;

/// Capabilities of one queue family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilySnapshot {
    /// Operations the family supports
    pub flags: vk::QueueFlags,
    /// Number of queues in the family
    pub queue_count: u32,
    /// Whether the family can present to the target surface
    pub present_support: bool,
}

/// Queue families the renderer needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics support
    pub graphics: Option<u32>,
    /// Graphics family when it can present, else the first presenting family
    pub present: Option<u32>,
    /// First family with compute support
    pub compute: Option<u32>,
    /// Last family with transfer support
    pub transfer: Option<u32>,
}

impl QueueFamilyIndices {
    /// Resolve family indices from a device's queue families
    pub fn resolve(families: &[QueueFamilySnapshot]) -> Self {
        let indexed = || families.iter().enumerate().map(|(i, f)| (i as u32, f));

        let graphics = indexed().find(|(_, f)| f.flags.contains(vk::QueueFlags::GRAPHICS)).map(|(i, _)| i);
        let present = match graphics {
            Some(g) if families[g as usize].present_support => Some(g),
            _ => indexed().find(|(_, f)| f.present_support).map(|(i, _)| i),
        };
        let compute = indexed().find(|(_, f)| f.flags.contains(vk::QueueFlags::COMPUTE)).map(|(i, _)| i);
        let transfer = indexed()
            .filter(|(_, f)| f.flags.contains(vk::QueueFlags::TRANSFER))
            .last()
            .map(|(i, _)| i);

        Self {
            graphics,
            present,
            compute,
            transfer,
        }
    }

    /// Number of required families that were not found
    pub fn missing(&self) -> usize {
        [self.graphics, self.present, self.compute, self.transfer]
            .iter()
            .filter(|family| family.is_none())
            .count()
    }
}

/// Capability snapshot of one physical device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Driver-reported device name
    pub name: String,
    /// Discrete, integrated, CPU, ...
    pub device_type: vk::PhysicalDeviceType,
    /// Queue families in driver order
    pub queue_families: Vec<QueueFamilySnapshot>,
    /// Number of formats the surface supports on this device
    pub surface_format_count: usize,
    /// Number of present modes the surface supports on this device
    pub present_mode_count: usize,
    /// Whether `VK_KHR_swapchain` is available
    pub supports_swapchain: bool,
}

impl DeviceCandidate {
    /// Suitability score. Anything at or below zero is unusable.
    pub fn score(&self) -> i64 {
        let mut score = match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => DISCRETE_GPU_SCORE,
            vk::PhysicalDeviceType::INTEGRATED_GPU => INTEGRATED_GPU_SCORE,
            vk::PhysicalDeviceType::CPU => CPU_SCORE,
            _ => DISQUALIFIED,
        };

        score += self.queue_families.iter().map(|f| i64::from(f.queue_count)).sum::<i64>();

        let missing = QueueFamilyIndices::resolve(&self.queue_families).missing()
            + usize::from(self.surface_format_count == 0)
            + usize::from(self.present_mode_count == 0)
            + usize::from(!self.supports_swapchain);
        score + DISQUALIFIED * missing as i64
    }
}

/// Index of the best candidate.
///
/// The running best starts at zero and is only replaced by a strictly higher
/// score, so ties keep the earliest device.
pub fn select_best(candidates: &[DeviceCandidate]) -> VulkanResult<usize> {
    if candidates.is_empty() {
        return Err(VulkanError::NoPhysicalDevices);
    }

    let mut best = None;
    let mut best_score = 0;
    for (index, candidate) in candidates.iter().enumerate() {
        let score = candidate.score();
        log::info!("GPU candidate {}: {} ({:?}) score {}", index, candidate.name, candidate.device_type, score);
        if score > best_score {
            best = Some(index);
            best_score = score;
        }
    }

    best.ok_or(VulkanError::NoSuitableDevice)
}

/// The selected physical device and everything resolved about it
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Driver-reported device name
    pub name: String,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Index of the compute queue family
    pub compute_family: u32,
    /// Index of the transfer queue family
    pub transfer_family: u32,
    /// Score that won selection
    pub score: i64,
}

impl PhysicalDeviceInfo {
    /// Enumerate every GPU, score it against `surface`, and keep the best
    pub fn enumerate_and_select(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        let candidates = devices
            .iter()
            .map(|&device| Self::snapshot(instance, surface_loader, surface, device))
            .collect::<VulkanResult<Vec<_>>>()?;

        let chosen = select_best(&candidates)?;
        let candidate = &candidates[chosen];
        let device = devices[chosen];
        let families = QueueFamilyIndices::resolve(&candidate.queue_families);

        let (graphics_family, present_family, compute_family, transfer_family) =
            match (families.graphics, families.present, families.compute, families.transfer) {
                (Some(g), Some(p), Some(c), Some(t)) => (g, p, c, t),
                _ => return Err(VulkanError::NoSuitableDevice),
            };

        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let score = candidate.score();

        log::info!(
            "Selected GPU: {} (score {}, graphics {}, present {}, compute {}, transfer {})",
            candidate.name,
            score,
            graphics_family,
            present_family,
            compute_family,
            transfer_family
        );

        Ok(Self {
            device,
            name: candidate.name.clone(),
            properties,
            features,
            memory_properties,
            graphics_family,
            present_family,
            compute_family,
            transfer_family,
            score,
        })
    }

    fn snapshot(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> VulkanResult<DeviceCandidate> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) }
            .iter()
            .enumerate()
            .map(|(index, family)| {
                let present_support = unsafe {
                    surface_loader
                        .get_physical_device_surface_support(device, index as u32, surface)
                        .map_err(VulkanError::Api)?
                };
                Ok(QueueFamilySnapshot {
                    flags: family.queue_flags,
                    queue_count: family.queue_count,
                    present_support,
                })
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let surface_format_count = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
                .len()
        };
        let present_mode_count = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
                .len()
        };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let supports_swapchain = extensions.iter().any(|available| {
            let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            extension_name == SwapchainLoader::name()
        });

        Ok(DeviceCandidate {
            name,
            device_type: properties.device_type,
            queue_families,
            surface_format_count,
            present_mode_count,
            supports_swapchain,
        })
    }

    /// Distinct queue families that need a queue on the logical device
    pub fn unique_families(&self) -> Vec<u32> {
        let families: BTreeSet<u32> = [self.graphics_family, self.present_family, self.transfer_family]
            .into_iter()
            .collect();
        families.into_iter().collect()
    }

    /// Whether uploads run on a different family than rendering
    pub fn has_dedicated_transfer(&self) -> bool {
        self.transfer_family != self.graphics_family
    }

    /// Largest anisotropy the sampler may request
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32, present_support: bool) -> QueueFamilySnapshot {
        QueueFamilySnapshot {
            flags,
            queue_count,
            present_support,
        }
    }

    fn all_in_one() -> QueueFamilySnapshot {
        family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            1,
            true,
        )
    }

    fn candidate(name: &str, device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            device_type,
            queue_families: vec![all_in_one()],
            surface_format_count: 2,
            present_mode_count: 1,
            supports_swapchain: true,
        }
    }

    #[test]
    fn test_discrete_beats_integrated() {
        let candidates = [
            candidate("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate("cpu", vk::PhysicalDeviceType::CPU),
        ];
        assert_eq!(select_best(&candidates).ok(), Some(1));
    }

    #[test]
    fn test_score_adds_queue_counts() {
        let mut gpu = candidate("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU);
        gpu.queue_families = vec![
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 16, true),
            family(vk::QueueFlags::TRANSFER, 2, false),
        ];
        assert_eq!(gpu.score(), DISCRETE_GPU_SCORE + 18);
    }

    #[test]
    fn test_selected_score_is_maximal() {
        let mut more_queues = candidate("igpu-wide", vk::PhysicalDeviceType::INTEGRATED_GPU);
        more_queues.queue_families[0].queue_count = 8;
        let candidates = [
            candidate("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU),
            more_queues,
            candidate("cpu", vk::PhysicalDeviceType::CPU),
        ];
        let best = select_best(&candidates).expect("suitable device");
        assert!(candidates.iter().all(|c| candidates[best].score() >= c.score()));
        assert_eq!(best, 1);
    }

    #[test]
    fn test_ties_keep_earliest() {
        let candidates = [
            candidate("first", vk::PhysicalDeviceType::DISCRETE_GPU),
            candidate("second", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(select_best(&candidates).ok(), Some(0));
    }

    #[test]
    fn test_no_devices() {
        assert!(matches!(select_best(&[]), Err(VulkanError::NoPhysicalDevices)));
    }

    #[test]
    fn test_all_unsuitable() {
        let mut no_swapchain = candidate("a", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_swapchain.supports_swapchain = false;
        let mut no_formats = candidate("b", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_formats.surface_format_count = 0;
        let mut no_present = candidate("c", vk::PhysicalDeviceType::DISCRETE_GPU);
        no_present.queue_families[0].present_support = false;
        let other = candidate("d", vk::PhysicalDeviceType::OTHER);

        for c in [&no_swapchain, &no_formats, &no_present, &other] {
            assert!(c.score() <= 0, "{} should be excluded", c.name);
        }
        assert!(matches!(
            select_best(&[no_swapchain, no_formats, no_present, other]),
            Err(VulkanError::NoSuitableDevice)
        ));
    }

    #[test]
    fn test_present_prefers_graphics_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1, true),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1, true),
        ];
        let indices = QueueFamilyIndices::resolve(&families);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn test_present_falls_back_to_first_presenting_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1, false),
            family(vk::QueueFlags::COMPUTE, 1, false),
            family(vk::QueueFlags::TRANSFER, 1, true),
            family(vk::QueueFlags::TRANSFER, 1, true),
        ];
        let indices = QueueFamilyIndices::resolve(&families);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(2));
        assert_eq!(indices.compute, Some(1));
        assert_eq!(indices.transfer, Some(3));
        assert_eq!(indices.missing(), 0);
    }

    fn info_with_families(graphics: u32, present: u32, transfer: u32) -> PhysicalDeviceInfo {
        PhysicalDeviceInfo {
            device: vk::PhysicalDevice::null(),
            name: "test device".to_string(),
            properties: vk::PhysicalDeviceProperties::default(),
            features: vk::PhysicalDeviceFeatures::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            graphics_family: graphics,
            present_family: present,
            compute_family: graphics,
            transfer_family: transfer,
            score: 1,
        }
    }

    #[test]
    fn test_dedicated_transfer_family() {
        let shared = info_with_families(0, 0, 0);
        assert!(!shared.has_dedicated_transfer());
        assert_eq!(shared.unique_families(), vec![0]);

        let dedicated = info_with_families(0, 0, 2);
        assert!(dedicated.has_dedicated_transfer());
        assert_eq!(dedicated.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_missing_compute_is_counted() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1, true)];
        assert_eq!(QueueFamilyIndices::resolve(&families).missing(), 1);
    }
}

//! Semaphores for acquire/submit/present ordering
//!
//! Frames are not pipelined: the present queue is drained after every present,
//! so a single pair of binary semaphores is enough and no fences are needed.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};
use super::tracker::{ResourceKind, ResourceTracker, TrackedResource};

/// Binary semaphore with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
    _tracked: TrackedResource,
}

impl Semaphore {
    /// Create an unsignaled binary semaphore
    pub fn new(device: Device, tracker: &ResourceTracker) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self {
            device,
            semaphore,
            _tracked: tracker.track(ResourceKind::Semaphore),
        })
    }

    /// Get semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// The frame's semaphore pair
pub struct FrameSync {
    /// Signaled by acquire, waited on by submit
    pub image_available: Semaphore,
    /// Signaled by submit, waited on by present
    pub render_finished: Semaphore,
}

impl FrameSync {
    /// Create both semaphores
    pub fn new(device: Device, tracker: &ResourceTracker) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone(), tracker)?,
            render_finished: Semaphore::new(device, tracker)?,
        })
    }
}

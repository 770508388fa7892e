//! GPU resource accounting
//!
//! Every RAII wrapper that owns a Vulkan handle holds a `TrackedResource`.
//! Creating one bumps the counter for its kind; dropping it bumps the
//! destroyed counter. Live counts must stay flat across swapchain rebuilds.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kinds of handles the engine creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `VkBuffer` with its memory
    Buffer,
    /// `VkImage` with its memory
    Image,
    /// `VkImageView`
    ImageView,
    /// `VkSampler`
    Sampler,
    /// `VkSwapchainKHR`
    Swapchain,
    /// `VkRenderPass`
    RenderPass,
    /// `VkPipeline` with its layout
    Pipeline,
    /// `VkFramebuffer`
    Framebuffer,
    /// `VkShaderModule`
    ShaderModule,
    /// Batch of command buffers
    CommandBuffers,
    /// `VkCommandPool`
    CommandPool,
    /// `VkSemaphore`
    Semaphore,
    /// `VkDescriptorSetLayout`
    DescriptorSetLayout,
    /// `VkDescriptorPool`
    DescriptorPool,
}

impl ResourceKind {
    /// Every kind, in reporting order
    pub const ALL: [ResourceKind; 14] = [
        ResourceKind::Buffer,
        ResourceKind::Image,
        ResourceKind::ImageView,
        ResourceKind::Sampler,
        ResourceKind::Swapchain,
        ResourceKind::RenderPass,
        ResourceKind::Pipeline,
        ResourceKind::Framebuffer,
        ResourceKind::ShaderModule,
        ResourceKind::CommandBuffers,
        ResourceKind::CommandPool,
        ResourceKind::Semaphore,
        ResourceKind::DescriptorSetLayout,
        ResourceKind::DescriptorPool,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Default)]
struct Counters {
    created: [AtomicU64; ResourceKind::ALL.len()],
    destroyed: [AtomicU64; ResourceKind::ALL.len()],
}

/// Shared creation and destruction counters
///
/// Cloning shares the same counters.
#[derive(Clone, Default)]
pub struct ResourceTracker {
    counters: Arc<Counters>,
}

impl ResourceTracker {
    /// Create a tracker with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the creation of a resource; the guard records its destruction
    pub fn track(&self, kind: ResourceKind) -> TrackedResource {
        self.counters.created[kind.slot()].fetch_add(1, Ordering::Relaxed);
        log::trace!("Created {:?}", kind);
        TrackedResource {
            kind,
            counters: Arc::clone(&self.counters),
        }
    }

    /// Number of resources of `kind` ever created
    pub fn created(&self, kind: ResourceKind) -> u64 {
        self.counters.created[kind.slot()].load(Ordering::Relaxed)
    }

    /// Number of resources of `kind` destroyed
    pub fn destroyed(&self, kind: ResourceKind) -> u64 {
        self.counters.destroyed[kind.slot()].load(Ordering::Relaxed)
    }

    /// Resources of `kind` currently alive
    pub fn live(&self, kind: ResourceKind) -> u64 {
        self.created(kind).saturating_sub(self.destroyed(kind))
    }

    /// All live resources
    pub fn total_live(&self) -> u64 {
        ResourceKind::ALL.iter().map(|&kind| self.live(kind)).sum()
    }

    /// Live count for every kind
    pub fn snapshot(&self) -> Vec<(ResourceKind, u64)> {
        ResourceKind::ALL.iter().map(|&kind| (kind, self.live(kind))).collect()
    }

    /// Kinds with resources still alive, and how many
    pub fn leaked(&self) -> Vec<(ResourceKind, u64)> {
        self.snapshot().into_iter().filter(|&(_, live)| live > 0).collect()
    }

    /// Log created/destroyed counts; warns about anything still alive
    pub fn log_report(&self) {
        for kind in ResourceKind::ALL {
            let (created, destroyed) = (self.created(kind), self.destroyed(kind));
            if created == 0 {
                continue;
            }
            if created == destroyed {
                log::debug!("{:?}: {} created, {} destroyed", kind, created, destroyed);
            } else {
                log::warn!("{:?}: {} created, {} destroyed, {} leaked", kind, created, destroyed, created - destroyed);
            }
        }
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.leaked()).finish()
    }
}

/// Logs the tracker's report when dropped.
///
/// Declare it after every field holding tracked resources so the report
/// sees them destroyed.
pub struct TeardownReport {
    tracker: ResourceTracker,
}

impl TeardownReport {
    /// Report on `tracker` at drop time
    pub fn new(tracker: &ResourceTracker) -> Self {
        Self {
            tracker: tracker.clone(),
        }
    }
}

impl Drop for TeardownReport {
    fn drop(&mut self) {
        self.tracker.log_report();
    }
}

/// Guard held by the owner of a Vulkan handle
pub struct TrackedResource {
    kind: ResourceKind,
    counters: Arc<Counters>,
}

impl TrackedResource {
    /// Kind this guard accounts for
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl Drop for TrackedResource {
    fn drop(&mut self) {
        self.counters.destroyed[self.kind.slot()].fetch_add(1, Ordering::Relaxed);
        log::trace!("Destroyed {:?}", self.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts_create_and_destroy() {
        let tracker = ResourceTracker::new();
        let guard = tracker.track(ResourceKind::Buffer);
        assert_eq!(tracker.live(ResourceKind::Buffer), 1);
        drop(guard);
        assert_eq!(tracker.live(ResourceKind::Buffer), 0);
        assert_eq!(tracker.created(ResourceKind::Buffer), 1);
        assert_eq!(tracker.destroyed(ResourceKind::Buffer), 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let tracker = ResourceTracker::new();
        let clone = tracker.clone();
        let _view = clone.track(ResourceKind::ImageView);
        assert_eq!(tracker.live(ResourceKind::ImageView), 1);
        assert_eq!(tracker.total_live(), 1);
    }

    #[test]
    fn test_regenerating_a_set_keeps_live_count_flat() {
        let tracker = ResourceTracker::new();
        let mut generation: Vec<TrackedResource> = (0..3).map(|_| tracker.track(ResourceKind::Framebuffer)).collect();
        for _ in 0..5 {
            generation.clear();
            generation.extend((0..3).map(|_| tracker.track(ResourceKind::Framebuffer)));
        }
        assert_eq!(generation.len(), 3);
        assert_eq!(tracker.live(ResourceKind::Framebuffer), 3);
        assert_eq!(tracker.created(ResourceKind::Framebuffer), 18);
    }

    #[test]
    fn test_leaked_lists_only_live_kinds() {
        let tracker = ResourceTracker::new();
        let pool = tracker.track(ResourceKind::CommandPool);
        let buffer = tracker.track(ResourceKind::Buffer);
        drop(tracker.track(ResourceKind::Sampler));

        assert_eq!(
            tracker.leaked(),
            vec![(ResourceKind::Buffer, 1), (ResourceKind::CommandPool, 1)]
        );
        drop(buffer);
        drop(pool);
        assert!(tracker.leaked().is_empty());
    }

    #[test]
    fn test_report_fields_drop_after_tracked_fields() {
        struct Owner {
            _pool: TrackedResource,
            _report: TeardownReport,
        }

        let tracker = ResourceTracker::new();
        let owner = Owner {
            _pool: tracker.track(ResourceKind::CommandPool),
            _report: TeardownReport::new(&tracker),
        };
        assert_eq!(tracker.live(ResourceKind::CommandPool), 1);
        drop(owner);
        assert!(tracker.leaked().is_empty());
    }

    #[test]
    fn test_slots_are_distinct() {
        for (i, kind) in ResourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.slot(), i);
        }
    }
}

//! Per-frame acquire, submit and present protocol
//!
//! `FrameSubmitter` owns the protocol state; the Vulkan side is reached
//! through `FrameTarget` so the state machine runs against a mock in tests.
//!
//! ```text
//! Idle -> Acquiring -> Submitted -> Presenting -> Idle
//!            |                          |
//!            +------> Rebuilding <------+
//!                         |
//!                         +-> Idle
//! ```

use crate::render::vulkan::VulkanResult;

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired; `image_available` will be signaled
    Ready(u32),
    /// Swapchain is out of date or suboptimal
    NeedsRebuild,
}

/// Result of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Queued for display
    Presented,
    /// Swapchain is out of date or suboptimal
    NeedsRebuild,
}

/// Operations the submitter drives
pub trait FrameTarget {
    /// Acquire the next image without a timeout
    fn acquire(&mut self) -> VulkanResult<AcquireOutcome>;

    /// Submit the pre-recorded commands for `image_index`
    fn submit(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Present `image_index` and wait for the present queue to drain
    fn present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Rebuild the swapchain and everything bound to it
    fn rebuild(&mut self) -> VulkanResult<()>;
}

/// Protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    /// Between frames
    #[default]
    Idle,
    /// Waiting for a swapchain image
    Acquiring,
    /// Commands submitted
    Submitted,
    /// Present queued
    Presenting,
    /// Swapchain chain being rebuilt
    Rebuilding,
}

/// How a frame ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// An image reached the presentation engine
    Presented,
    /// The frame was dropped and the chain rebuilt
    Rebuilt,
}

/// Counters over the submitter's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames presented
    pub frames_presented: u64,
    /// Chain rebuilds
    pub rebuilds: u64,
    /// Command buffer submissions
    pub submits: u64,
}

/// Drives one frame at a time through a `FrameTarget`
#[derive(Debug, Default)]
pub struct FrameSubmitter {
    state: FrameState,
    stats: FrameStats,
}

impl FrameSubmitter {
    /// Submitter in `Idle`
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one frame. Any error returns the submitter to `Idle`.
    pub fn draw_frame(&mut self, target: &mut dyn FrameTarget) -> VulkanResult<FrameOutcome> {
        let result = self.run(target);
        self.state = FrameState::Idle;
        result
    }

    fn run(&mut self, target: &mut dyn FrameTarget) -> VulkanResult<FrameOutcome> {
        self.state = FrameState::Acquiring;
        let image_index = match target.acquire()? {
            AcquireOutcome::Ready(index) => index,
            AcquireOutcome::NeedsRebuild => {
                log::warn!("Swapchain out of date on acquire, rebuilding");
                return self.rebuild(target);
            }
        };

        target.submit(image_index)?;
        self.state = FrameState::Submitted;
        self.stats.submits += 1;

        self.state = FrameState::Presenting;
        match target.present(image_index)? {
            PresentOutcome::Presented => {
                self.stats.frames_presented += 1;
                Ok(FrameOutcome::Presented)
            }
            PresentOutcome::NeedsRebuild => {
                log::warn!("Swapchain out of date on present, rebuilding");
                self.rebuild(target)
            }
        }
    }

    fn rebuild(&mut self, target: &mut dyn FrameTarget) -> VulkanResult<FrameOutcome> {
        self.state = FrameState::Rebuilding;
        target.rebuild()?;
        self.stats.rebuilds += 1;
        Ok(FrameOutcome::Rebuilt)
    }

    /// Current state; `Idle` whenever `draw_frame` is not running
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Lifetime counters
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::{ResourceKind, ResourceTracker, TrackedResource, VulkanError};
    use ash::vk;
    use std::collections::VecDeque;

    /// Scripted target that also owns one "generation" of tracked resources,
    /// replaced on every rebuild
    struct MockTarget {
        acquires: VecDeque<VulkanResult<AcquireOutcome>>,
        presents: VecDeque<PresentOutcome>,
        log: Vec<String>,
        tracker: ResourceTracker,
        generation: Vec<TrackedResource>,
    }

    impl MockTarget {
        fn new(acquires: Vec<VulkanResult<AcquireOutcome>>, presents: Vec<PresentOutcome>) -> Self {
            let tracker = ResourceTracker::new();
            let mut target = Self {
                acquires: acquires.into(),
                presents: presents.into(),
                log: Vec::new(),
                tracker,
                generation: Vec::new(),
            };
            target.build_generation();
            target
        }

        fn build_generation(&mut self) {
            self.generation.clear();
            let kinds = [
                ResourceKind::Swapchain,
                ResourceKind::ImageView,
                ResourceKind::ImageView,
                ResourceKind::Framebuffer,
                ResourceKind::Framebuffer,
                ResourceKind::Pipeline,
                ResourceKind::RenderPass,
                ResourceKind::CommandBuffers,
            ];
            let tracker = self.tracker.clone();
            self.generation.extend(kinds.iter().map(|&kind| tracker.track(kind)));
        }

        fn count(&self, entry: &str) -> usize {
            self.log.iter().filter(|e| e.starts_with(entry)).count()
        }
    }

    impl FrameTarget for MockTarget {
        fn acquire(&mut self) -> VulkanResult<AcquireOutcome> {
            self.log.push("acquire".to_string());
            self.acquires.pop_front().unwrap_or(Ok(AcquireOutcome::Ready(0)))
        }

        fn submit(&mut self, image_index: u32) -> VulkanResult<()> {
            self.log.push(format!("submit {}", image_index));
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome> {
            self.log.push(format!("present {}", image_index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn rebuild(&mut self) -> VulkanResult<()> {
            self.log.push("rebuild".to_string());
            self.build_generation();
            Ok(())
        }
    }

    #[test]
    fn test_normal_frame_order() {
        let mut target = MockTarget::new(vec![Ok(AcquireOutcome::Ready(2))], vec![]);
        let mut submitter = FrameSubmitter::new();

        let outcome = submitter.draw_frame(&mut target).expect("frame");

        assert_eq!(outcome, FrameOutcome::Presented);
        assert_eq!(target.log, vec!["acquire", "submit 2", "present 2"]);
        assert_eq!(submitter.state(), FrameState::Idle);
        assert_eq!(submitter.stats().frames_presented, 1);
    }

    #[test]
    fn test_three_out_of_date_acquires() {
        let acquires = (0..3).map(|_| Ok(AcquireOutcome::NeedsRebuild)).collect();
        let mut target = MockTarget::new(acquires, vec![]);
        let mut submitter = FrameSubmitter::new();
        let live_before = target.tracker.total_live();

        for _ in 0..3 {
            let outcome = submitter.draw_frame(&mut target).expect("frame");
            assert_eq!(outcome, FrameOutcome::Rebuilt);
            assert_eq!(submitter.state(), FrameState::Idle);
        }

        assert_eq!(target.count("rebuild"), 3);
        assert_eq!(target.count("submit"), 0);
        assert_eq!(submitter.stats().rebuilds, 3);
        assert_eq!(submitter.stats().submits, 0);
        assert_eq!(target.tracker.total_live(), live_before);
        assert_eq!(target.tracker.created(ResourceKind::Swapchain), 4);
    }

    #[test]
    fn test_out_of_date_present_rebuilds_after_submit() {
        let mut target = MockTarget::new(vec![Ok(AcquireOutcome::Ready(0))], vec![PresentOutcome::NeedsRebuild]);
        let mut submitter = FrameSubmitter::new();

        let outcome = submitter.draw_frame(&mut target).expect("frame");

        assert_eq!(outcome, FrameOutcome::Rebuilt);
        assert_eq!(target.log, vec!["acquire", "submit 0", "present 0", "rebuild"]);
        assert_eq!(submitter.stats().frames_presented, 0);
        assert_eq!(submitter.stats().rebuilds, 1);
    }

    #[test]
    fn test_other_errors_propagate_and_reset_state() {
        let mut target = MockTarget::new(vec![Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))], vec![]);
        let mut submitter = FrameSubmitter::new();

        let result = submitter.draw_frame(&mut target);

        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
        assert_eq!(submitter.state(), FrameState::Idle);
        assert_eq!(target.count("rebuild"), 0);

        // Next frame proceeds normally
        assert_eq!(submitter.draw_frame(&mut target).expect("frame"), FrameOutcome::Presented);
    }
}

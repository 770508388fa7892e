//! Descriptor set layouts, pools and writes
//!
//! The scene uses a single set: binding 0 is the camera block, binding 1 the
//! per-instance transform block, binding 2 the texture sampler.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};
use super::tracker::{ResourceKind, ResourceTracker, TrackedResource};

/// Binding of the camera uniform block
pub const CAMERA_BINDING: u32 = 0;
/// Binding of the per-instance transform block
pub const INSTANCE_BINDING: u32 = 1;
/// Binding of the combined image sampler
pub const TEXTURE_BINDING: u32 = 2;

/// Descriptor set layout builder
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    fn add(mut self, binding: u32, descriptor_type: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device, tracker: &ResourceTracker) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
            bindings: self.bindings,
            _tracked: tracker.track(ResourceKind::DescriptorSetLayout),
        })
    }
}

/// The scene's three-binding layout
pub fn scene_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .add_uniform_buffer(CAMERA_BINDING, vk::ShaderStageFlags::VERTEX)
        .add_uniform_buffer(INSTANCE_BINDING, vk::ShaderStageFlags::VERTEX)
        .add_combined_image_sampler(TEXTURE_BINDING, vk::ShaderStageFlags::FRAGMENT)
}

/// Descriptor set layout wrapper with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    _tracked: TrackedResource,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool sized for sets of one layout
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
    _tracked: TrackedResource,
}

impl DescriptorPool {
    /// Pool with room for `max_sets` sets of `layout`
    pub fn new(device: Device, layout: &DescriptorSetLayout, max_sets: u32, tracker: &ResourceTracker) -> VulkanResult<Self> {
        let pool_sizes = pool_sizes(layout.bindings(), max_sets);

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            pool,
            device,
            _tracked: tracker.track(ResourceKind::DescriptorPool),
        })
    }

    /// Allocate one set of `layout`; it lives as long as the pool
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)?;
        sets.into_iter().next().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "descriptor pool returned no sets".to_string(),
        })
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// One pool size entry per descriptor type used by `bindings`
fn pool_sizes(bindings: &[vk::DescriptorSetLayoutBinding], max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        let count = binding.descriptor_count * max_sets;
        match sizes.iter_mut().find(|size| size.ty == binding.descriptor_type) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: count,
            }),
        }
    }
    sizes
}

enum PendingWrite {
    Buffer(u32, vk::DescriptorBufferInfo),
    Image(u32, vk::DescriptorImageInfo),
}

/// Collects writes to one descriptor set and applies them together
pub struct DescriptorSetWriter {
    set: vk::DescriptorSet,
    pending: Vec<PendingWrite>,
}

impl DescriptorSetWriter {
    /// Writer targeting `set`
    pub fn new(set: vk::DescriptorSet) -> Self {
        Self {
            set,
            pending: Vec::new(),
        }
    }

    /// Bind the whole of `buffer` as a uniform block
    pub fn uniform_buffer(mut self, binding: u32, buffer: vk::Buffer, range: vk::DeviceSize) -> Self {
        self.pending.push(PendingWrite::Buffer(
            binding,
            vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            },
        ));
        self
    }

    /// Bind a sampled image in `SHADER_READ_ONLY_OPTIMAL`
    pub fn combined_image_sampler(mut self, binding: u32, view: vk::ImageView, sampler: vk::Sampler) -> Self {
        self.pending.push(PendingWrite::Image(
            binding,
            vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        ));
        self
    }

    /// Execute all write operations
    pub fn update(self, device: &Device) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|pending| match pending {
                PendingWrite::Buffer(binding, info) => vk::WriteDescriptorSet::builder()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build(),
                PendingWrite::Image(binding, info) => vk::WriteDescriptorSet::builder()
                    .dst_set(self.set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info))
                    .build(),
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
        log::debug!("Updated {} descriptor bindings", writes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_layout_bindings() {
        let builder = scene_layout();
        let summary: Vec<_> = builder
            .bindings()
            .iter()
            .map(|b| (b.binding, b.descriptor_type, b.stage_flags))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
                (1, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
                (2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT),
            ]
        );
    }

    #[test]
    fn test_pool_sizes_merge_types() {
        let builder = scene_layout();
        let sizes = pool_sizes(builder.bindings(), 1);
        let summary: Vec<_> = sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect();
        assert_eq!(
            summary,
            vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 2),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
            ]
        );
    }
}

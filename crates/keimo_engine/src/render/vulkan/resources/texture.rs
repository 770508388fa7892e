//! Sampled textures with a full mip chain
//!
//! Level 0 is uploaded through `TransferContext`; the remaining levels are
//! produced on the GPU by blitting each level from the one before it.
//! `MipChain` is the plan for that: level extents plus the ordered list of
//! barriers and blits, kept free of Vulkan calls so it can be checked on
//! the CPU.

use ash::{vk, Device};

use crate::assets::ImageData;
use crate::render::vulkan::buffer::{Buffer, HOST_VISIBLE_COHERENT};
use crate::render::vulkan::context::{VulkanError, VulkanResult};
use crate::render::vulkan::image::{Image, ImageDesc, ImageView};
use crate::render::vulkan::tracker::{ResourceKind, ResourceTracker, TrackedResource};
use crate::render::vulkan::transfer::TransferContext;

/// Texel format of every texture
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Bytes per texel of `TEXTURE_FORMAT`
pub const TEXEL_SIZE: u32 = 4;

/// Anisotropy requested when the device supports it
pub const MAX_ANISOTROPY: f32 = 16.0;

/// One blit from `src_level` into the level after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBlit {
    /// Level read from
    pub src_level: u32,
    /// Extent of the source level
    pub src_extent: (u32, u32),
    /// Extent of `src_level + 1`
    pub dst_extent: (u32, u32),
}

/// A command in the mip generation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStep {
    /// Layout barrier on a single level
    Barrier {
        /// Mip level
        level: u32,
        /// Layout before
        old: vk::ImageLayout,
        /// Layout after
        new: vk::ImageLayout,
    },
    /// Downsampling blit
    Blit(MipBlit),
}

/// Level extents of a mip chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MipChain {
    extents: Vec<(u32, u32)>,
}

impl MipChain {
    /// `floor(log2(max(w, h))) + 1` levels, each `max(1, previous / 2)`
    pub fn plan(width: u32, height: u32) -> Self {
        let largest = width.max(height).max(1);
        let level_count = u32::BITS - largest.leading_zeros();

        let mut extents = Vec::with_capacity(level_count as usize);
        let mut extent = (width.max(1), height.max(1));
        for _ in 0..level_count {
            extents.push(extent);
            extent = ((extent.0 / 2).max(1), (extent.1 / 2).max(1));
        }

        Self { extents }
    }

    /// Number of levels
    pub fn level_count(&self) -> u32 {
        self.extents.len() as u32
    }

    /// Extent of every level, level 0 first
    pub fn extents(&self) -> &[(u32, u32)] {
        &self.extents
    }

    /// Barriers and blits taking every level from `TRANSFER_DST_OPTIMAL`
    /// to `SHADER_READ_ONLY_OPTIMAL`
    pub fn steps(&self) -> Vec<MipStep> {
        let mut steps = Vec::with_capacity(self.extents.len() * 3);
        for (src_level, pair) in self.extents.windows(2).enumerate() {
            let level = src_level as u32;
            steps.push(MipStep::Barrier {
                level,
                old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            });
            steps.push(MipStep::Blit(MipBlit {
                src_level: level,
                src_extent: pair[0],
                dst_extent: pair[1],
            }));
            steps.push(MipStep::Barrier {
                level,
                old: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            });
        }
        steps.push(MipStep::Barrier {
            level: self.level_count().saturating_sub(1),
            old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        });
        steps
    }
}

type BarrierScope = (vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags);

/// Access masks and stages of the per-level edges mip generation and
/// readback use
fn barrier_scope(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<BarrierScope> {
    match (old, new) {
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL) => Ok((
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        )),
        (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL) => Ok((
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (from, to) => Err(VulkanError::UnsupportedLayoutTransition { from, to }),
    }
}

/// Reject images Vulkan cannot be asked to create or fill
fn check_image_data(width: u32, height: u32, len: usize) -> VulkanResult<()> {
    if width == 0 || height == 0 {
        return Err(VulkanError::InvalidOperation {
            reason: format!("texture extent {}x{} is empty", width, height),
        });
    }
    let expected = width as usize * height as usize * TEXEL_SIZE as usize;
    if len != expected {
        return Err(VulkanError::InvalidOperation {
            reason: format!("{}x{} texture needs {} bytes, got {}", width, height, expected, len),
        });
    }
    Ok(())
}

fn extent_offset(extent: (u32, u32)) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.0 as i32,
        y: extent.1 as i32,
        z: 1,
    }
}

fn color_layer(level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn record_mip_steps(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    steps: &[MipStep],
) -> VulkanResult<()> {
    for step in steps {
        match *step {
            MipStep::Barrier { level, old, new } => {
                let (src_access, dst_access, src_stage, dst_stage) = barrier_scope(old, new)?;
                let barrier = vk::ImageMemoryBarrier::builder()
                    .old_layout(old)
                    .new_layout(new)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: level,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .src_access_mask(src_access)
                    .dst_access_mask(dst_access)
                    .build();
                unsafe {
                    device.cmd_pipeline_barrier(
                        command_buffer,
                        src_stage,
                        dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }
            }
            MipStep::Blit(blit) => {
                let region = vk::ImageBlit::builder()
                    .src_offsets([vk::Offset3D { x: 0, y: 0, z: 0 }, extent_offset(blit.src_extent)])
                    .src_subresource(color_layer(blit.src_level))
                    .dst_offsets([vk::Offset3D { x: 0, y: 0, z: 0 }, extent_offset(blit.dst_extent)])
                    .dst_subresource(color_layer(blit.src_level + 1))
                    .build();
                unsafe {
                    device.cmd_blit_image(
                        command_buffer,
                        image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                        vk::Filter::LINEAR,
                    );
                }
            }
        }
    }
    Ok(())
}

struct Sampler {
    device: Device,
    sampler: vk::Sampler,
    _tracked: TrackedResource,
}

impl Sampler {
    fn new(device: Device, level_count: u32, anisotropy: Option<f32>, tracker: &ResourceTracker) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(level_count as f32);

        let sampler = unsafe { device.create_sampler(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self {
            device,
            sampler,
            _tracked: tracker.track(ResourceKind::Sampler),
        })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Image, view and sampler of one texture
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
    image: Image,
    mip_chain: MipChain,
}

impl Texture {
    /// Upload `data` and build its mip chain
    pub fn from_image_data(transfer: &TransferContext, data: &ImageData) -> VulkanResult<Self> {
        if !transfer.supports_linear_blit(TEXTURE_FORMAT) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{:?} does not support linear blitting", TEXTURE_FORMAT),
            });
        }

        let (width, height) = (data.width(), data.height());
        check_image_data(width, height, data.data().len())?;

        let mip_chain = MipChain::plan(width, height);
        let device = transfer.device().clone();
        let tracker = transfer.tracker();

        let image = Image::new(
            device.clone(),
            transfer.memory_properties(),
            ImageDesc {
                extent: vk::Extent2D { width, height },
                format: TEXTURE_FORMAT,
                mip_levels: mip_chain.level_count(),
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
            },
            tracker,
        )?;

        transfer.upload_to_image(data.data(), &image)?;
        Self::generate_mipmaps(transfer, &image, &mip_chain)?;

        let view = ImageView::new(
            device.clone(),
            image.handle(),
            TEXTURE_FORMAT,
            vk::ImageAspectFlags::COLOR,
            mip_chain.level_count(),
            tracker,
        )?;

        let anisotropy = transfer.max_sampler_anisotropy().map(|limit| MAX_ANISOTROPY.min(limit));
        let sampler = Sampler::new(device, mip_chain.level_count(), anisotropy, tracker)?;

        log::info!(
            "Texture created: {}x{}, {} mip levels, anisotropy {:?}",
            width,
            height,
            mip_chain.level_count(),
            anisotropy
        );

        Ok(Self {
            sampler,
            view,
            image,
            mip_chain,
        })
    }

    fn generate_mipmaps(transfer: &TransferContext, image: &Image, mip_chain: &MipChain) -> VulkanResult<()> {
        let steps = mip_chain.steps();
        transfer.submit_graphics(|device, command_buffer| {
            record_mip_steps(device, command_buffer, image.handle(), &steps)
        })
    }

    /// Copy mip `level` back to the host as tightly packed RGBA8.
    ///
    /// The level is moved to `TRANSFER_SRC_OPTIMAL` for the copy and returned
    /// to `SHADER_READ_ONLY_OPTIMAL` afterwards.
    pub fn read_back_level(&self, transfer: &TransferContext, level: u32) -> VulkanResult<Vec<u8>> {
        let (width, height) = self
            .mip_chain
            .extents()
            .get(level as usize)
            .copied()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("texture has {} mip levels, asked for {}", self.mip_chain.level_count(), level),
            })?;
        let size = vk::DeviceSize::from(width) * vk::DeviceSize::from(height) * vk::DeviceSize::from(TEXEL_SIZE);

        let readback = Buffer::new(
            transfer.device().clone(),
            transfer.memory_properties(),
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            HOST_VISIBLE_COHERENT,
            &[],
            transfer.tracker(),
        )?;

        let to_source = [MipStep::Barrier {
            level,
            old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            new: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        }];
        let to_shader = [MipStep::Barrier {
            level,
            old: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let image = self.image.handle();

        transfer.submit_graphics(|device, command_buffer| {
            record_mip_steps(device, command_buffer, image, &to_source)?;
            let region = vk::BufferImageCopy::builder()
                .image_subresource(color_layer(level))
                .image_extent(vk::Extent3D { width, height, depth: 1 })
                .build();
            unsafe {
                device.cmd_copy_image_to_buffer(
                    command_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    readback.handle(),
                    &[region],
                );
            }
            record_mip_steps(device, command_buffer, image, &to_shader)
        })?;

        readback.read_bytes(size as usize)
    }

    /// View over every level
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    /// Sampler handle
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.sampler
    }

    /// Underlying image
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Mip chain the texture was built with
    pub fn mip_chain(&self) -> &MipChain {
        &self.mip_chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays the steps over per-level layouts, checking blit preconditions
    fn simulate(chain: &MipChain) -> Vec<vk::ImageLayout> {
        let mut layouts = vec![vk::ImageLayout::TRANSFER_DST_OPTIMAL; chain.level_count() as usize];
        for step in chain.steps() {
            match step {
                MipStep::Barrier { level, old, new } => {
                    assert_eq!(layouts[level as usize], old, "barrier on level {}", level);
                    layouts[level as usize] = new;
                }
                MipStep::Blit(blit) => {
                    let src = blit.src_level as usize;
                    assert_eq!(layouts[src], vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
                    assert_eq!(layouts[src + 1], vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                }
            }
        }
        layouts
    }

    #[test]
    fn test_two_by_two_has_two_levels() {
        let chain = MipChain::plan(2, 2);
        assert_eq!(chain.level_count(), 2);
        assert_eq!(chain.extents(), &[(2, 2), (1, 1)]);
        assert!(simulate(&chain)
            .iter()
            .all(|&layout| layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
    }

    #[test]
    fn test_level_count_formula() {
        assert_eq!(MipChain::plan(1, 1).level_count(), 1);
        assert_eq!(MipChain::plan(512, 512).level_count(), 10);
        assert_eq!(MipChain::plan(512, 256).level_count(), 10);
        assert_eq!(MipChain::plan(5, 3).level_count(), 3);
        assert_eq!(MipChain::plan(1024, 1).level_count(), 11);
    }

    #[test]
    fn test_levels_halve_with_floor_of_one() {
        let chain = MipChain::plan(8, 2);
        assert_eq!(chain.extents(), &[(8, 2), (4, 1), (2, 1), (1, 1)]);
        for pair in chain.extents().windows(2) {
            assert_eq!(pair[1], ((pair[0].0 / 2).max(1), (pair[0].1 / 2).max(1)));
        }
    }

    #[test]
    fn test_every_level_ends_shader_readable() {
        for (w, h) in [(1, 1), (3, 7), (256, 64), (1000, 999)] {
            let layouts = simulate(&MipChain::plan(w, h));
            assert!(layouts
                .iter()
                .all(|&layout| layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        }
    }

    #[test]
    fn test_single_level_only_transitions() {
        let steps = MipChain::plan(1, 1).steps();
        assert_eq!(
            steps,
            vec![MipStep::Barrier {
                level: 0,
                old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }]
        );
    }

    #[test]
    fn test_barrier_scopes() {
        let (src, dst, _, dst_stage) = barrier_scope(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .expect("mip edge");
        assert_eq!((src, dst), (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ));
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        let (src, _, _, dst_stage) = barrier_scope(
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .expect("mip edge");
        assert_eq!(src, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let (src, dst, src_stage, _) = barrier_scope(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .expect("readback edge");
        assert_eq!((src, dst), (vk::AccessFlags::SHADER_READ, vk::AccessFlags::TRANSFER_READ));
        assert_eq!(src_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_every_planned_barrier_has_a_scope() {
        for step in MipChain::plan(300, 17).steps() {
            if let MipStep::Barrier { old, new, .. } = step {
                assert!(barrier_scope(old, new).is_ok(), "{:?} -> {:?}", old, new);
            }
        }
    }

    #[test]
    fn test_unknown_barrier_edges_are_rejected() {
        let unknown = [
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR),
        ];
        for (from, to) in unknown {
            assert!(matches!(
                barrier_scope(from, to),
                Err(VulkanError::UnsupportedLayoutTransition { .. })
            ));
        }
    }

    #[test]
    fn test_empty_or_short_image_data_is_rejected() {
        assert!(matches!(check_image_data(0, 0, 0), Err(VulkanError::InvalidOperation { .. })));
        assert!(matches!(check_image_data(4, 0, 0), Err(VulkanError::InvalidOperation { .. })));
        assert!(matches!(check_image_data(2, 2, 15), Err(VulkanError::InvalidOperation { .. })));
        assert!(check_image_data(2, 2, 16).is_ok());
    }
}

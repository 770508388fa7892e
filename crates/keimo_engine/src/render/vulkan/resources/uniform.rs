//! Host-visible uniform blocks and the per-frame values written into them

use std::marker::PhantomData;

use ash::vk;
use bytemuck::Pod;

use crate::foundation::math::{deg_to_rad, to_cols_array, Mat4, Mat4Ext};
use crate::render::primitives::Camera;
use crate::render::vulkan::buffer::{Buffer, HOST_VISIBLE_COHERENT};
use crate::render::vulkan::context::VulkanResult;
use crate::render::vulkan::transfer::TransferContext;

/// Degrees per second the model spins about Z
pub const ROTATION_DEGREES_PER_SECOND: f32 = 90.0;

/// Camera block at binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraUniform {
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip
    pub proj: [[f32; 4]; 4],
}

/// Per-instance block at binding 1
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceUniform {
    /// Model to world
    pub model: [[f32; 4]; 4],
}

// Column arrays of f32, no padding
unsafe impl bytemuck::Pod for CameraUniform {}
unsafe impl bytemuck::Zeroable for CameraUniform {}
unsafe impl bytemuck::Pod for InstanceUniform {}
unsafe impl bytemuck::Zeroable for InstanceUniform {}

/// Both blocks for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    /// Camera block
    pub camera: CameraUniform,
    /// Instance block
    pub instance: InstanceUniform,
}

impl FrameUniforms {
    /// Values for `time` seconds after start
    pub fn compute(camera: &Camera, time: f32) -> Self {
        let model = Mat4::rotation_z(time * deg_to_rad(ROTATION_DEGREES_PER_SECOND));
        Self {
            camera: CameraUniform {
                view: to_cols_array(&camera.view_matrix()),
                proj: to_cols_array(&camera.projection_matrix()),
            },
            instance: InstanceUniform {
                model: to_cols_array(&model),
            },
        }
    }
}

/// Uniform buffer holding exactly one `T`, rewritten wholesale
pub struct UniformBlock<T: Pod> {
    buffer: Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBlock<T> {
    /// Allocate the block and write `initial` into it
    pub fn new(transfer: &TransferContext, initial: &T) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            transfer.device().clone(),
            transfer.memory_properties(),
            std::mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            HOST_VISIBLE_COHERENT,
            &[],
            transfer.tracker(),
        )?;
        let block = Self {
            buffer,
            _marker: PhantomData,
        };
        block.update(initial)?;
        Ok(block)
    }

    /// Map, copy, unmap
    pub fn update(&self, value: &T) -> VulkanResult<()> {
        self.buffer.write_bytes(bytemuck::bytes_of(value))
    }

    /// Buffer handle for descriptor writes
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size of `T` in bytes
    pub fn range(&self) -> vk::DeviceSize {
        std::mem::size_of::<T>() as vk::DeviceSize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_block_sizes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 128);
        assert_eq!(std::mem::size_of::<InstanceUniform>(), 64);
    }

    #[test]
    fn test_model_starts_at_identity() {
        let uniforms = FrameUniforms::compute(&Camera::default(), 0.0);
        let identity = to_cols_array(&Mat4::identity());
        for (column, expected) in uniforms.instance.model.iter().zip(&identity) {
            for (value, want) in column.iter().zip(expected) {
                assert_relative_eq!(*value, *want, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_model_rotates_ninety_degrees_per_second() {
        let uniforms = FrameUniforms::compute(&Camera::default(), 1.0);
        let model = uniforms.instance.model;
        // x axis maps to y after a quarter turn
        assert_relative_eq!(model[0][0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(model[0][1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(model[2][2], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_camera_block_matches_camera() {
        let camera = Camera::default();
        let uniforms = FrameUniforms::compute(&camera, 0.5);
        assert_eq!(uniforms.camera.view, to_cols_array(&camera.view_matrix()));
        assert_eq!(uniforms.camera.proj, to_cols_array(&camera.projection_matrix()));
    }
}

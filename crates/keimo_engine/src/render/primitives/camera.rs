//! # 3D Camera
//!
//! Perspective camera producing the view and projection matrices consumed by
//! the camera uniform block. View space is right-handed and Y-up; the
//! conversion to Vulkan's Y-down clip space is a separate matrix so the view
//! math stays conventional.

use crate::foundation::math::{deg_to_rad, Mat4, Mat4Ext, Vec3};

/// Perspective camera
///
/// Matrices are computed on demand from the public fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a perspective camera looking at the origin with +Y up
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov: deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Point the camera at `target` with the given up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Update the aspect ratio after a resize
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// Projection matrix including the Vulkan coordinate flip.
    ///
    /// This is `P × X`; the shader multiplies it with the view and model
    /// matrices from the uniform blocks.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov, self.aspect, self.near, self.far) * Mat4::vulkan_coordinate_transform()
    }

    /// Combined `P × X × V`
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

impl Default for Camera {
    /// Looks down at the origin from (2, 2, 2) with Z up, the way the demo
    /// quad is framed
    fn default() -> Self {
        Self {
            position: Vec3::new(2.0, 2.0, 2.0),
            target: Vec3::zeros(),
            up: Vec3::z(),
            fov: deg_to_rad(45.0),
            aspect: 800.0 / 600.0,
            near: 0.1,
            far: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;

    fn project(camera: &Camera, point: Vec3) -> Vec3 {
        let clip = camera.view_projection_matrix() * Vec4::new(point.x, point.y, point.z, 1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn test_target_projects_to_center() {
        let camera = Camera::default();
        let ndc = project(&camera, camera.target);
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_up_is_negative_y_in_clip_space() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 45.0, 1.0, 0.1, 100.0);
        let ndc = project(&camera, Vec3::new(0.0, 1.0, 0.0));
        assert!(ndc.y < 0.0, "Vulkan clip space points Y down, got {}", ndc.y);
    }

    #[test]
    fn test_points_behind_near_plane_fall_outside_depth_range() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 45.0, 1.0, 1.0, 100.0);
        let ndc = project(&camera, Vec3::new(0.0, 0.0, 4.5));
        assert!(ndc.z < 0.0);
    }

    #[test]
    fn test_aspect_ratio_update() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio(2.0);
        assert_relative_eq!(camera.aspect, 2.0);
    }
}

use glam::{Mat3, Mat4, Vec3};

/// View and projection shared by every drawable of a submission.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub projection: Mat4,
    pub view: Mat4,
    pub position: Vec3,
}

impl Camera {
    /// Identity matrices: drawables are given directly in clip space.
    pub fn identity() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            position: Vec3::ZERO,
        }
    }

    /// Right-handed perspective camera at `eye` looking at `target`, +Y up.
    pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32, eye: Vec3, target: Vec3) -> Self {
        Self {
            projection: Mat4::perspective_rh(fov_y_radians, aspect.max(f32::EPSILON), near, far),
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            position: eye,
        }
    }

    /// Moves the eye, keeping the projection.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3) {
        self.view = Mat4::look_at_rh(eye, target, Vec3::Y);
        self.position = eye;
    }

    /// View with the translation removed, for geometry pinned to the eye.
    #[inline]
    pub fn rotation_only_view(&self) -> Mat4 {
        Mat4::from_mat3(Mat3::from_mat4(self.view))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::identity()
    }
}

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub projection: Mat4,
    pub view: Mat4,
    pub combined: Mat4,
    pub position: Vec3,
}

impl Camera {
    pub fn new(projection: Mat4, view: Mat4, position: Vec3) -> Self {
        Self {
            projection,
            view,
            combined: projection * view,
            position,
        }
    }

    /// Right-handed perspective camera looking from `eye` at `target`.
    pub fn perspective(
        eye: Vec3,
        target: Vec3,
        fov_y_radians: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let projection = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        Self::new(projection, view, eye)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_is_projection_times_view() {
        let camera = Camera::perspective(
            Vec3::new(0.0, 2.0, 5.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            0.1,
            100.0,
        );
        assert!(camera
            .combined
            .abs_diff_eq(camera.projection * camera.view, 1e-6));
    }
}

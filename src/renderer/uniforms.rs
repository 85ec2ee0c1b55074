// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::camera::Camera;
use super::lights::{
    DirectionalLightRaw, PointLightRaw, MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS,
};
use crate::environment::Environment;

/// Per-frame block bound at group 0. Mirrors `Frame` in `bindings.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct FrameUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub combined: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub ambient: [f32; 4],
    /// x: directional count, y: point count.
    pub counts: [u32; 4],
    pub directionals: [DirectionalLightRaw; MAX_DIRECTIONAL_LIGHTS],
    pub points: [PointLightRaw; MAX_POINT_LIGHTS],
}

impl FrameUniform {
    /// Lights beyond the fixed array sizes are dropped; callers check the
    /// counts before building the uniform.
    pub fn new(camera: &Camera, environment: &Environment) -> Self {
        let mut uniform = Self {
            projection: camera.projection.to_cols_array_2d(),
            view: camera.view.to_cols_array_2d(),
            combined: camera.combined.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            ambient: environment.ambient().extend(1.0).to_array(),
            counts: [0; 4],
            directionals: [DirectionalLightRaw::PLACEHOLDER; MAX_DIRECTIONAL_LIGHTS],
            points: [PointLightRaw::PLACEHOLDER; MAX_POINT_LIGHTS],
        };

        let dir_count = environment
            .directional_lights()
            .len()
            .min(MAX_DIRECTIONAL_LIGHTS);
        uniform.counts[0] = dir_count as u32;
        for (dst, src) in uniform
            .directionals
            .iter_mut()
            .zip(environment.directional_lights())
        {
            *dst = DirectionalLightRaw::from_data(src);
        }

        let point_count = environment.point_lights().len().min(MAX_POINT_LIGHTS);
        uniform.counts[1] = point_count as u32;
        for (dst, src) in uniform.points.iter_mut().zip(environment.point_lights()) {
            *dst = PointLightRaw::from_data(src);
        }

        uniform
    }
}

/// One instance slot in the storage buffer bound at group 2.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

impl InstanceRaw {
    pub fn from_transform(transform: &Mat4) -> Self {
        Self {
            model: transform.to_cols_array_2d(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::lights::DirectionalLightData;
    use glam::Vec3;

    #[test]
    fn frame_uniform_is_560_bytes() {
        // 3 * mat4x4<f32> = 192, 3 * vec4 = 48, 10 lights * 32 = 320
        assert_eq!(std::mem::size_of::<FrameUniform>(), 560);
    }

    #[test]
    fn instance_is_64_bytes() {
        assert_eq!(std::mem::size_of::<InstanceRaw>(), 64);
    }

    #[test]
    fn unused_light_slots_hold_placeholders() {
        let mut environment = Environment::default();
        environment.add_directional(DirectionalLightData::new(
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::ONE,
            2.0,
        ));

        let uniform = FrameUniform::new(&Camera::default(), &environment);

        assert_eq!(uniform.counts, [1, 0, 0, 0]);
        assert_eq!(uniform.directionals[0].color_intensity[3], 2.0);
        for slot in &uniform.directionals[1..] {
            assert_eq!(*slot, DirectionalLightRaw::PLACEHOLDER);
        }
        for slot in &uniform.points {
            assert_eq!(*slot, PointLightRaw::PLACEHOLDER);
        }
    }
}

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

pub const MAX_DIRECTIONAL_LIGHTS: usize = 5;
pub const MAX_POINT_LIGHTS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLightData {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl DirectionalLightData {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLightData {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct DirectionalLightRaw {
    pub direction: [f32; 4],
    pub color_intensity: [f32; 4],
}

impl DirectionalLightRaw {
    /// Fills unused slots: pointing straight down, contributing nothing.
    pub const PLACEHOLDER: Self = Self {
        direction: [0.0, -1.0, 0.0, 0.0],
        color_intensity: [1.0, 1.0, 1.0, 0.0],
    };

    pub fn from_data(data: &DirectionalLightData) -> Self {
        Self {
            direction: [data.direction.x, data.direction.y, data.direction.z, 0.0],
            color_intensity: [data.color.x, data.color.y, data.color.z, data.intensity],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct PointLightRaw {
    pub position_range: [f32; 4],
    pub color_intensity: [f32; 4],
}

impl PointLightRaw {
    pub const PLACEHOLDER: Self = Self {
        position_range: [0.0; 4],
        color_intensity: [0.0; 4],
    };

    pub fn from_data(data: &PointLightData) -> Self {
        Self {
            position_range: [
                data.position.x,
                data.position.y,
                data.position.z,
                data.range,
            ],
            color_intensity: [data.color.x, data.color.y, data.color.z, data.intensity],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_lights_are_32_bytes() {
        assert_eq!(std::mem::size_of::<DirectionalLightRaw>(), 32);
        assert_eq!(std::mem::size_of::<PointLightRaw>(), 32);
    }

    #[test]
    fn directional_direction_is_normalized() {
        let light = DirectionalLightData::new(Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, 1.0);
        let raw = DirectionalLightRaw::from_data(&light);
        assert_eq!(raw.direction, [0.0, -1.0, 0.0, 0.0]);
    }
}

use glam::Vec3;
use wgpu::Color;

use crate::renderer::lights::{DirectionalLightData, PointLightData};

/// Describes the global lighting state applied while batching a frame.
///
/// The environment carries the clear color, the ambient term and the
/// scene's directional and point lights. The batch engine copies it into the
/// frame uniform at `begin`.
#[derive(Debug, Clone)]
pub struct Environment {
    clear_color: Color,
    ambient: Vec3,
    directional: Vec<DirectionalLightData>,
    point: Vec<PointLightData>,
}

impl Environment {
    /// Creates an environment with the provided clear color and no lights.
    pub fn new(clear_color: Color) -> Self {
        Self {
            clear_color,
            ambient: Vec3::splat(0.03),
            directional: Vec::new(),
            point: Vec::new(),
        }
    }

    /// Returns the clear color that should be used when starting a frame.
    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    /// Sets the clear color used for rendering.
    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    /// Returns a copy of the environment with the given clear color.
    pub fn with_clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    pub fn with_ambient(mut self, ambient: Vec3) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn add_directional(&mut self, light: DirectionalLightData) {
        self.directional.push(light);
    }

    pub fn add_point(&mut self, light: PointLightData) {
        self.point.push(light);
    }

    pub fn clear_lights(&mut self) {
        self.directional.clear();
        self.point.clear();
    }

    pub fn directional_lights(&self) -> &[DirectionalLightData] {
        &self.directional
    }

    pub fn point_lights(&self) -> &[PointLightData] {
        &self.point
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(Color {
            r: 0.231,
            g: 0.269,
            b: 0.338,
            a: 1.0,
        })
    }
}

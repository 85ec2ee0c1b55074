use bytemuck::{Pod, Zeroable};

use crate::gpu::TextureId;

/// Surface parameters for one or more drawables.
///
/// The batch engine compares materials by their [`Handle`](crate::asset::Handle)
/// only; two materials with equal fields are still two materials.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub diffuse_texture: Option<TextureId>,
    pub normal_texture: Option<TextureId>,
    pub emissive_texture: Option<TextureId>,
    pub alpha_blend: bool,
}

impl Material {
    pub fn new(base_color: [f32; 4]) -> Self {
        Self {
            base_color,
            metallic: 0.0,
            roughness: 1.0,
            diffuse_texture: None,
            normal_texture: None,
            emissive_texture: None,
            alpha_blend: false,
        }
    }

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new([r, g, b, 1.0])
    }

    pub fn white() -> Self {
        Self::rgb(1.0, 1.0, 1.0)
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_diffuse_texture(mut self, texture: TextureId) -> Self {
        self.diffuse_texture = Some(texture);
        self
    }

    pub fn with_normal_texture(mut self, texture: TextureId) -> Self {
        self.normal_texture = Some(texture);
        self
    }

    pub fn with_emissive_texture(mut self, texture: TextureId) -> Self {
        self.emissive_texture = Some(texture);
        self
    }

    pub fn with_alpha(mut self) -> Self {
        self.alpha_blend = true;
        self
    }

    pub fn has_normal_map(&self) -> bool {
        self.normal_texture.is_some()
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::white()
    }
}

/// GPU-side material block, one per material slot.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    /// x: metallic, y: roughness, z: 1.0 when an emissive texture is bound.
    pub params: [f32; 4],
}

impl MaterialUniform {
    pub fn from_material(material: &Material) -> Self {
        let emissive = if material.emissive_texture.is_some() {
            1.0
        } else {
            0.0
        };
        Self {
            base_color: material.base_color,
            params: [material.metallic, material.roughness, emissive, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_uniform_is_32_bytes() {
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 32);
    }

    #[test]
    fn factors_are_clamped() {
        let material = Material::white().with_metallic(2.0).with_roughness(-1.0);
        let uniform = MaterialUniform::from_material(&material);
        assert_eq!(uniform.params[0], 1.0);
        assert_eq!(uniform.params[1], 0.0);
    }
}

use crate::gpu::{GpuError, GpuFacade, ShaderId};
use crate::renderer::{Material, VertexLayoutDescriptor};

/// The two shader variants a batch picks between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderPrograms {
    standard: ShaderId,
    normal_mapped: ShaderId,
}

impl ShaderPrograms {
    pub fn new(standard: ShaderId, normal_mapped: ShaderId) -> Self {
        Self {
            standard,
            normal_mapped,
        }
    }

    /// Compiles the shaders shipped with the crate.
    pub fn builtin<G: GpuFacade + ?Sized>(gpu: &mut G) -> Result<Self, GpuError> {
        let standard = gpu.create_shader("ModelBatchShader", &Self::standard_source())?;
        let normal_mapped =
            gpu.create_shader("ModelBatchNormalMapShader", &Self::normal_mapped_source())?;
        Ok(Self::new(standard, normal_mapped))
    }

    pub fn standard_source() -> String {
        format!(
            "{}\n{}\n{}",
            include_str!("../shader/bindings.wgsl"),
            include_str!("../shader/lighting.wgsl"),
            include_str!("../shader/modelbatch.wgsl")
        )
    }

    pub fn normal_mapped_source() -> String {
        format!(
            "{}\n{}\n{}",
            include_str!("../shader/bindings.wgsl"),
            include_str!("../shader/lighting.wgsl"),
            include_str!("../shader/modelbatch_normal_map.wgsl")
        )
    }

    pub fn standard(&self) -> ShaderId {
        self.standard
    }

    pub fn normal_mapped(&self) -> ShaderId {
        self.normal_mapped
    }

    /// Normal mapping needs both tangents in the vertex data and a normal
    /// texture on the material.
    pub fn select(&self, layout: &VertexLayoutDescriptor, material: &Material) -> ShaderId {
        if layout.has_normal_map() && material.has_normal_map() {
            self.normal_mapped
        } else {
            self.standard
        }
    }

    pub fn destroy<G: GpuFacade + ?Sized>(self, gpu: &mut G) {
        gpu.destroy_shader(self.standard);
        gpu.destroy_shader(self.normal_mapped);
    }
}
